//! Derive macros for the Tirtha architecture.
//!
//! # Available Macros
//!
//! - `#[derive(Action)]` - generates helpers for action enums whose variants
//!   are split into commands (requests to change state) and events (facts
//!   about what happened)
//!
//! # Example
//!
//! ```ignore
//! use tirtha_macros::Action;
//!
//! #[derive(Action, Clone, Debug)]
//! enum BookingAction {
//!     #[command]
//!     CreateBooking { temple_id: TempleId },
//!
//!     #[event]
//!     BookingCreated { booking_id: BookingId },
//! }
//!
//! // Generated methods:
//! assert!(BookingAction::CreateBooking { .. }.is_command());
//! assert!(BookingAction::BookingCreated { .. }.is_event());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, parse_macro_input};

/// Derive macro for Action enums
///
/// Generates helper methods for action enums:
/// - `is_command()` - true if this variant is marked `#[command]`
/// - `is_event()` - true if this variant is marked `#[event]`
/// - `label()` - the variant name, for structured logging
///
/// # Attributes
///
/// - `#[command]` - mark a variant as a command
/// - `#[event]` - mark a variant as an event
///
/// # Panics
///
/// Produces a compile error (not a runtime panic) if:
/// - Applied to a non-enum type
/// - A variant carries both `#[command]` and `#[event]`
#[proc_macro_derive(Action, attributes(command, event))]
pub fn derive_action(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let Data::Enum(data_enum) = &input.data else {
        return syn::Error::new_spanned(input, "#[derive(Action)] can only be used on enums")
            .to_compile_error()
            .into();
    };

    let mut command_arms = Vec::new();
    let mut event_arms = Vec::new();
    let mut label_arms = Vec::new();

    for variant in &data_enum.variants {
        let variant_name = &variant.ident;
        let is_command = has_attribute(&variant.attrs, "command");
        let is_event = has_attribute(&variant.attrs, "event");

        if is_command && is_event {
            return syn::Error::new_spanned(
                variant,
                "Variant cannot be both #[command] and #[event]",
            )
            .to_compile_error()
            .into();
        }

        let pattern = match &variant.fields {
            Fields::Named(_) => quote! { Self::#variant_name { .. } },
            Fields::Unnamed(_) => quote! { Self::#variant_name(..) },
            Fields::Unit => quote! { Self::#variant_name },
        };

        if is_command {
            command_arms.push(quote! { #pattern => true, });
        }
        if is_event {
            event_arms.push(quote! { #pattern => true, });
        }

        let label = variant_name.to_string();
        label_arms.push(quote! { #pattern => #label, });
    }

    let expanded = quote! {
        impl #name {
            /// Returns true if this action is a command
            #[must_use]
            pub const fn is_command(&self) -> bool {
                match self {
                    #(#command_arms)*
                    _ => false,
                }
            }

            /// Returns true if this action is an event
            #[must_use]
            pub const fn is_event(&self) -> bool {
                match self {
                    #(#event_arms)*
                    _ => false,
                }
            }

            /// The variant name, for structured logging
            #[must_use]
            pub const fn label(&self) -> &'static str {
                match self {
                    #(#label_arms)*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// Check if an attribute list contains a specific attribute
fn has_attribute(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}
