//! Procedural macros for tool shim exports.
//!
//! `#[tool]` keeps the annotated async function unchanged and submits an
//! export registration for it, so the module registry can discover the tool
//! without any hand-written wiring.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{ItemFn, LitStr, parse_macro_input};

#[derive(Default)]
struct ToolArgs {
    module: Option<LitStr>,
    name: Option<LitStr>,
    default: bool,
    callable: bool,
}

/// Registers an async function as a tool export.
///
/// The function must have the shape
/// `async fn(ToolContext, serde_json::Value) -> ToolResult<serde_json::Value>`.
///
/// * `module = "tools/echo"`: module id the export belongs to (required).
/// * `name = "run"`: export name; defaults to the function name.
/// * `default`: place the export on the module's `default` export. Without
///   `name` the function becomes the default export itself.
/// * `callable`: make the function the module itself.
#[proc_macro_attribute]
pub fn tool(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = ToolArgs::default();
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("module") {
            args.module = Some(meta.value()?.parse()?);
        } else if meta.path.is_ident("name") {
            args.name = Some(meta.value()?.parse()?);
        } else if meta.path.is_ident("default") {
            args.default = true;
        } else if meta.path.is_ident("callable") {
            args.callable = true;
        } else {
            return Err(meta.error("expected `module`, `name`, `default`, or `callable`"));
        }
        Ok(())
    });
    parse_macro_input!(attr with parser);
    let function = parse_macro_input!(item as ItemFn);

    expand(args, &function)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(args: ToolArgs, function: &ItemFn) -> syn::Result<TokenStream2> {
    let module = args
        .module
        .ok_or_else(|| syn::Error::new(Span::call_site(), "missing `module = \"...\"`"))?;
    if function.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            function.sig.fn_token,
            "#[tool] functions must be async",
        ));
    }
    if args.default && args.callable {
        return Err(syn::Error::new(
            Span::call_site(),
            "`default` and `callable` are mutually exclusive",
        ));
    }

    let ident = &function.sig.ident;
    let has_name = args.name.is_some();
    let export = args
        .name
        .map_or_else(|| ident.to_string(), |name| name.value());
    let slot = match (args.callable, args.default, has_name) {
        (true, _, _) => quote!(::shim_tools::registry::ExportSlot::Module),
        (false, true, false) => quote!(::shim_tools::registry::ExportSlot::Default),
        (false, true, true) => quote! {
            ::shim_tools::registry::ExportSlot::DefaultNamed(::std::borrow::Cow::Borrowed(#export))
        },
        (false, false, _) => quote! {
            ::shim_tools::registry::ExportSlot::Named(::std::borrow::Cow::Borrowed(#export))
        },
    };
    let shim = format_ident!("__shim_tools_export_{}", ident);

    Ok(quote! {
        #function

        #[doc(hidden)]
        #[allow(non_snake_case)]
        fn #shim(
            ctx: ::shim_tools::ToolContext,
            input: ::shim_tools::serde_json::Value,
        ) -> ::shim_tools::registry::ToolFuture {
            ::std::boxed::Box::pin(#ident(ctx, input))
        }

        ::shim_tools::inventory::submit! {
            ::shim_tools::registry::ExportRegistration::function(#module, #slot, #shim)
        }
    })
}
