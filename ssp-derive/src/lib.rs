use proc_macro::TokenStream;
use quote::quote;

fn get_enum_variants(
    input: &syn::DeriveInput,
) -> &syn::punctuated::Punctuated<syn::Variant, syn::token::Comma> {
    let variants = match &input.data {
        syn::Data::Enum(enum_item) => &enum_item.variants,
        _ => panic!("Input must be an enum."),
    };

    assert!(
        variants.iter().all(|v| v.fields.is_empty()),
        "All variants must have no fields."
    );

    variants
}

/// Derives `EnumFromStr`/`FromStr`, matching the variant's name
/// case-insensitively (mirroring the original `Opcode.from_string`'s
/// `string.upper()` lookup).
#[proc_macro_derive(EnumFromStr)]
pub fn enum_from_str_derive(input: TokenStream) -> TokenStream {
    let syn_item: syn::DeriveInput = syn::parse(input).unwrap();
    let name = &syn_item.ident;
    let name_str = name.to_string();
    let variants = get_enum_variants(&syn_item);
    let literals = variants.iter().map(|v| v.ident.to_string().to_uppercase());
    let identifiers = variants.iter().map(|v| &v.ident);

    let expanded = quote! {
        impl EnumFromStr for #name {
            fn from_str(s: &str) -> Result<#name, ::ssp_util::ParseEnumError> {
                match s.to_uppercase().as_str() {
                    #( #literals => Ok(#name::#identifiers), )*
                    _ => Err(::ssp_util::ParseEnumError {
                        value: s.to_string(),
                        enum_name: #name_str,
                    }),
                }
            }
        }

        impl ::core::str::FromStr for #name {
            type Err = ::ssp_util::ParseEnumError;

            fn from_str(s: &str) -> Result<#name, ::ssp_util::ParseEnumError> {
                EnumFromStr::from_str(s)
            }
        }
    };
    expanded.into()
}

/// Derives `Display` printing the bare variant name in upper case, the
/// inverse of `EnumFromStr` (mirroring `Opcode.to_string`/`TokenType.to_string`).
#[proc_macro_derive(EnumDisplay)]
pub fn enum_display_derive(input: TokenStream) -> TokenStream {
    let syn_item: syn::DeriveInput = syn::parse(input).unwrap();
    let name = &syn_item.ident;
    let variants = get_enum_variants(&syn_item);
    let identifiers = variants.iter().map(|v| &v.ident);
    let literals = variants.iter().map(|v| v.ident.to_string().to_uppercase());

    let expanded = quote! {
        impl ::core::fmt::Display for #name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                let s = match self {
                    #( #name::#identifiers => #literals, )*
                };
                write!(f, "{}", s)
            }
        }
    };
    expanded.into()
}
