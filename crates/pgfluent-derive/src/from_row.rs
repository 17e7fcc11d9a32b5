//! FromRow derive macro implementation

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Index, Result};

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input,
            "FromRow can only be derived for structs",
        ));
    };

    let body = match &data.fields {
        Fields::Named(fields) => {
            let extracts = fields
                .named
                .iter()
                .map(|field| {
                    let field_name = field.ident.as_ref().ok_or_else(|| {
                        syn::Error::new_spanned(field, "expected a named field")
                    })?;
                    let column_name = column_name(field)?
                        .unwrap_or_else(|| field_name.to_string());
                    Ok(quote! {
                        #field_name: row.try_get(#column_name)?
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            quote! { Self { #(#extracts),* } }
        }
        // Tuple structs read columns by position.
        Fields::Unnamed(fields) => {
            let extracts = fields.unnamed.iter().enumerate().map(|(idx, _)| {
                let idx = Index::from(idx);
                quote! { row.try_get_index(#idx)? }
            });
            quote! { Self(#(#extracts),*) }
        }
        Fields::Unit => {
            return Err(syn::Error::new_spanned(
                &input,
                "FromRow cannot be derived for unit structs",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::pgfluent::FromRow for #name #ty_generics #where_clause {
            fn from_row(row: &::pgfluent::Row) -> ::pgfluent::OrmResult<Self> {
                Ok(#body)
            }
        }
    })
}

/// `#[orm(column = "...")]`, if present.
fn column_name(field: &syn::Field) -> Result<Option<String>> {
    let mut column = None;
    for attr in &field.attrs {
        if !attr.path().is_ident("orm") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("column") {
                let lit: syn::LitStr = meta.value()?.parse()?;
                column = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("unsupported orm attribute; expected `column`"))
            }
        })?;
    }
    Ok(column)
}
