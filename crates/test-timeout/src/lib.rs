//! Test attributes that fail a hung test instead of stalling the suite.
//!
//! Both attributes accept an optional limit: a bare integer (seconds),
//! `secs = N` or `millis = N`. The default is 60 seconds.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{parse_macro_input, Attribute, Ident, ItemFn, LitInt, Token};

const DEFAULT_LIMIT_MILLIS: u64 = 60_000;

struct Limit {
    millis: u64,
}

impl Parse for Limit {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.is_empty() {
            return Ok(Self {
                millis: DEFAULT_LIMIT_MILLIS,
            });
        }

        let (unit_millis, value) = if input.peek(Ident) {
            let unit: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            let value: LitInt = input.parse()?;
            match unit.to_string().as_str() {
                "secs" => (1_000, value),
                "millis" => (1, value),
                _ => return Err(syn::Error::new_spanned(unit, "expected `secs` or `millis`")),
            }
        } else {
            (1_000, input.parse::<LitInt>()?)
        };

        let millis = value
            .base10_parse::<u64>()?
            .checked_mul(unit_millis)
            .ok_or_else(|| syn::Error::new_spanned(&value, "timeout is too large"))?;
        if millis == 0 {
            return Err(syn::Error::new_spanned(
                &value,
                "timeout must be greater than zero",
            ));
        }
        Ok(Self { millis })
    }
}

/// Async test run on a fresh current-thread tokio runtime under a deadline.
///
/// The calling crate must depend on `tokio` with the `rt` and `time` features.
#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let limit = parse_macro_input!(attr as Limit);
    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            &sig.ident,
            "tokio_timeout_test can only be applied to async functions",
        )
        .to_compile_error()
        .into();
    }
    sig.asyncness = None;

    let attrs = strip_test_attributes(attrs);
    let body = quote! {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build Tokio runtime");
        runtime.block_on(async {
            tokio::time::timeout(limit, async move #block)
                .await
                .expect("test timed out");
        });
    };
    guarded(attrs, vis, sig, body, limit.millis).into()
}

/// Synchronous test run on its own thread under a deadline.
#[proc_macro_attribute]
pub fn timeout(attr: TokenStream, item: TokenStream) -> TokenStream {
    let limit = parse_macro_input!(attr as Limit);
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.is_some() {
        return syn::Error::new_spanned(
            &sig.ident,
            "timeout attribute expects a synchronous test function; use tokio_timeout_test",
        )
        .to_compile_error()
        .into();
    }

    let attrs = strip_test_attributes(attrs);
    let body = quote! { #block };
    guarded(attrs, vis, sig, body, limit.millis).into()
}

/// Wrap `body` so it runs on a helper thread and the test panics if it has
/// not reported back within `millis`. `limit` is in scope inside `body`.
fn guarded(
    attrs: Vec<Attribute>,
    vis: syn::Visibility,
    sig: syn::Signature,
    body: TokenStream2,
    millis: u64,
) -> TokenStream2 {
    quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let limit = std::time::Duration::from_millis(#millis);
            let (sender, receiver) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    #body
                }));
                let _ = sender.send(result);
            });
            match receiver.recv_timeout(limit) {
                Ok(Ok(_)) => {}
                Ok(Err(payload)) => std::panic::resume_unwind(payload),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    panic!("test timed out after {:?}", limit)
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    panic!("test thread failed before reporting result")
                }
            }
        }
    }
}

/// Drop `#[test]` and `#[tokio::test]`; the wrapper adds its own `#[test]`.
fn strip_test_attributes(attrs: Vec<Attribute>) -> Vec<Attribute> {
    attrs
        .into_iter()
        .filter(|attr| {
            let path: Vec<String> = attr
                .path()
                .segments
                .iter()
                .map(|segment| segment.ident.to_string())
                .collect();
            !matches!(path.as_slice(), [name] if name == "test")
                && !matches!(path.as_slice(), [krate, name] if krate == "tokio" && name == "test")
        })
        .collect()
}
