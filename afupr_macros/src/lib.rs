// This file is part of afupr, an application to orchestrate partial reconfiguration of FPGA accelerator function units.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// afupr is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// afupr is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Procedural macros used by the afupr daemon.

use proc_macro::TokenStream;
use quote::quote;
use syn::{ItemStruct, LitStr, parse_macro_input};

/// Mark a struct as a platform backend registered under `compat_string`.
///
/// Generates an associated `register_platform()` that adds the struct to the daemon's platform
/// registry. The struct must provide
/// `fn new(config: &DeviceConfig) -> Result<Self, PrdError>` and implement `Platform`.
///
/// ```rust,ignore
/// #[platform(compat_string = "simulated")]
/// pub struct SimulatedPlatform { .. }
///
/// SimulatedPlatform::register_platform();
/// ```
#[proc_macro_attribute]
pub fn platform(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut compat_string: Option<LitStr> = None;
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("compat_string") {
            compat_string = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("unsupported platform property"))
        }
    });
    parse_macro_input!(attr with parser);
    let item = parse_macro_input!(item as ItemStruct);

    let Some(compat_string) = compat_string else {
        return syn::Error::new_spanned(&item.ident, "missing compat_string = \"...\"")
            .to_compile_error()
            .into();
    };
    if compat_string.value().is_empty() {
        return syn::Error::new_spanned(&compat_string, "compat_string must not be empty")
            .to_compile_error()
            .into();
    }

    let name = &item.ident;
    let (impl_generics, ty_generics, where_clause) = item.generics.split_for_impl();
    let expanded = quote! {
        #item

        impl #impl_generics #name #ty_generics #where_clause {
            pub const COMPAT_STRING: &'static str = #compat_string;

            /// Add this platform to the platform registry.
            pub fn register_platform() {
                crate::platforms::platform::register_platform(#compat_string, |config| {
                    Ok(::std::boxed::Box::new(#name::new(config)?))
                });
            }
        }
    };
    expanded.into()
}
