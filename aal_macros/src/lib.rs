// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::collections::HashMap;

use proc_macro2::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::*;

struct Action<'a> {
    name: &'a Ident,
    action_name: String,
    action_args: Vec<&'a Ident>,
}

enum FieldType {
    Exact,
    Lpm,
    Ternary,
}

struct FieldInfo<'a> {
    name: &'a Ident,
    field_name: String,
    match_type: FieldType,
}

// For a single key, return the code that converts the set of FieldInfo structs
// into a vector of MatchEntryField structs
fn get_match_to_ir_converters(keys: &[FieldInfo]) -> TokenStream {
    let mut tokens = TokenStream::new();
    for key in keys {
        let kname = &key.field_name;
        let field = key.name;

        let conversion = match key.match_type {
            FieldType::Exact => quote! {
                aal::MatchEntryValue::Exact(
                aal::ValueTypes::from(self.#field) )
            },
            FieldType::Lpm => quote! {
                aal::MatchEntryValue::Lpm(
                aal::MatchLpm::from(self.#field) )
            },
            FieldType::Ternary => quote! {
                aal::MatchEntryValue::Ternary(
                aal::MatchTernary::from(self.#field))
            },
        };

        tokens.extend(quote! {
            fields.push(aal::MatchEntryField {
                name: #kname.to_string(),
                value: #conversion,
            });
        });
    }

    tokens
}

// Build the code that converts an IR representation of a key (as captured by a
// MatchData struct) into the original Struct used by the translators.
//
// NeighborKey {
//     neighbor: (&a.field_by_name("neighbor")?.value).try_into()
//     dst_ip: (&a.field_by_name("dst_ip")?.value).try_into()
// }
//
// A ternary field is declared with the type of its value, so the value is
// pulled out of the (value, mask) pair before converting it.
fn get_ir_to_match_converters(
    struct_name: &Ident,
    fields: &[FieldInfo],
) -> TokenStream {
    let mut field_code = TokenStream::new();
    for field in fields {
        // Name in the rust Struct
        let name = field.name;
        // Name in the p4 table
        let field_name = &field.field_name;
        let extract = match field.match_type {
            FieldType::Ternary => quote! {
                aal::MatchTernary::try_from(&a.field_by_name(#field_name)?.value)
                    .and_then(|t| (&t.value).try_into())
            },
            _ => quote! {
                (&a.field_by_name(#field_name)?.value).try_into()
            },
        };
        #[rustfmt::skip]
        field_code.extend(quote! {
	    #name: #extract
		.map_err(|e| {
			let msg = format!("Failed to convert {}: {e:?}",
			  stringify!(#name));
                      aal::IrError::Internal(msg)
                })?,
        });
    }
    quote! {
        #struct_name {
           #field_code
        }
    }
}

// Build the code that converts a set of arguments to a vector of ActionArg
// structs as part of an ActionParse::action_arg_to_ir() operation.
fn get_action_arg_to_ir_converters(args: &[&Ident]) -> TokenStream {
    let mut arg_code = TokenStream::new();

    for name in args {
        arg_code.extend(quote! {
            args.push(aal::ActionArg {
                name: stringify!(#name).to_string(),
                value: aal::ValueTypes::from(* #name),
            });
        });
    }

    arg_code
}

// Generate the code for conversion of a single Action in an enum to the
// intermediate representation.
//
// We're building something like:
//     Action::PushMac { mod_ptr, vport } => {
//         action = "evpn_gw_control.push_mac";
//         args.push(ActionArg {
//             name: "mod_ptr".to_string(),
//             value: aal::ValueTypes::from(*mod_ptr),
//         });
//         ...
//     },
fn get_action_to_ir_converter(
    enum_name: &Ident,
    action: &Action,
) -> TokenStream {
    let ident = action.name;
    let action_name = &action.action_name;

    // If the enum is data-bearing (i.e., if the Action takes one or more
    // arguments), construct the { a, b, c } needed to capture the contents
    // in appropriately named fields as part of the match.
    let mut arg_tokens = TokenStream::new();
    if !action.action_args.is_empty() {
        let t = &action.action_args;
        arg_tokens = quote! { { #(#t),* } };
    }
    let match_tokens = quote! {#enum_name::#ident #arg_tokens };
    let d = get_action_arg_to_ir_converters(&action.action_args);
    #[rustfmt::skip]
        quote! {
	    #match_tokens => {
		action = #action_name ;
		#d
	    },
	}
}

// Generate the code for conversion an intermediate representation of an Action
// back into the original Enum::Action{args}.  This will look something like:
//     match a.action.as_str() {
//         "evpn_gw_control.push_mac" => Ok(Action::PushMac {
//             mod_ptr: (&a.arg_by_name("mod_ptr")?.value)
//                 .try_into()
//                 .map_err(|e| aal::IrError::Internal(..))?,
//             vport: ...
//         }),
//     }
fn get_ir_to_action_converter(
    enum_name: &Ident,
    action: &Action,
) -> TokenStream {
    let ident = action.name;
    let action_name = &action.action_name;

    // If the enum is data-bearing (i.e., if the Action takes one or more
    // arguments), construct the { a: <value>, b: <value>} needed to convert
    // the args back into enum fields.
    let mut arg_tokens = TokenStream::new();
    if !action.action_args.is_empty() {
        let mut t = TokenStream::new();
        for name in &action.action_args {
            #[rustfmt::skip]
            t.extend(quote! {
	    #name: (&a.arg_by_name(stringify!(#name))?.value)
                .try_into()
                .map_err(|e| {
		    let msg = format!("Failed to convert {}: {e:?}",
			stringify!(#name));
                    aal::IrError::Internal(msg)
                })?,
	    });
        }
        arg_tokens = quote! { { #t } };
    }
    #[rustfmt::skip]
        quote! {
	    #action_name => Ok( #enum_name::#ident #arg_tokens),
	}
}

// Parse a single a = b attribute into an (a, b) tuple
fn get_attribute(m: &Meta) -> Result<(String, String)> {
    let err = Error::new(m.span(), "malformed attribute".to_string());
    let nv = match m {
        Meta::NameValue(nv) => nv,
        _ => return Err(err),
    };
    let attr = match nv.path.segments.first() {
        Some(seg) => seg.ident.to_string(),
        None => return Err(err),
    };
    let val = match &nv.lit {
        Lit::Str(l) => l.value(),
        _ => return Err(err),
    };

    Ok((attr, val))
}

fn is_matching_attribute(a: &Attribute, family: &str) -> bool {
    if let Some(ps) = a.path.segments.first() {
        ps.ident == family
    } else {
        false
    }
}

// From a #[action_xlate(..)] or #[match_xlate(..)] directive, extract all of
// the 'attribute = "value"' pairs
fn get_attributes(
    span: proc_macro2::Span,
    family: &str,
    attrs: &[Attribute],
) -> Result<HashMap<String, String>> {
    let mut found = HashMap::new();

    let err = Error::new(span, "bad attribute list".to_string());
    for a in attrs {
        if is_matching_attribute(a, family) {
            let list = match a.parse_meta() {
                Ok(Meta::List(l)) => l,
                _ => return Err(err),
            };
            for i in list.nested.iter() {
                let m = match i {
                    NestedMeta::Meta(m) => m,
                    _ => return Err(err),
                };
                let (attr, val) = get_attribute(m)?;
                found.insert(attr, val);
            }
        }
    }
    Ok(found)
}

// Given a struct, return a vector representing each element of the struct as a
// FieldInfo
fn get_fields<'a>(
    data: &'a Data,
    attr_name: &'static str,
) -> Result<Vec<FieldInfo<'a>>> {
    let mut fields = Vec::new();

    let named = {
        match *data {
            Data::Struct(ref data) => match data.fields {
                Fields::Named(ref f) => &f.named,
                _ => return Ok(fields),
            },
            _ => return Ok(fields),
        }
    };

    for f in named.iter() {
        let name = match f.ident.as_ref() {
            Some(name) => name,
            None => return Err(Error::new(f.span(), "unnamed key field")),
        };
        let attrs = get_attributes(f.span(), attr_name, &f.attrs)?;

        let match_type = match attrs.get("type") {
            None => FieldType::Exact,
            Some(t) => match t.as_str() {
                "lpm" => FieldType::Lpm,
                "ternary" => FieldType::Ternary,
                x => {
                    return Err(Error::new(
                        f.span(),
                        format!("unrecognized key type: {x}"),
                    ))
                }
            },
        };

        let field_name = match attrs.get("name") {
            Some(x) => x.clone(),
            None => name.to_string(),
        };

        fields.push(FieldInfo {
            name,
            field_name,
            match_type,
        });
    }

    Ok(fields)
}

// Given an enum, return a Vec with all of the possible actions and their
// arguments.
fn get_actions<'a>(
    data: &'a Data,
    attr_name: &'static str,
) -> Result<Vec<Action<'a>>> {
    let enum_variants = {
        match *data {
            Data::Enum(ref e) => &e.variants,
            _ => {
                return Err(Error::new(
                    proc_macro2::Span::call_site(),
                    "actions must be defined as an enum",
                ))
            }
        }
    };

    let mut actions = Vec::new();
    for v in enum_variants.iter() {
        let name = &v.ident;

        let attrs = get_attributes(v.span(), attr_name, &v.attrs)?;
        let action_name = match attrs.get("name") {
            Some(x) => x.clone(),
            None => name.to_string(),
        };

        let action_args = match &v.fields {
            Fields::Named(f) => f
                .named
                .iter()
                .filter_map(|arg| arg.ident.as_ref())
                .collect(),
            _ => Vec::new(),
        };
        actions.push(Action {
            name,
            action_name,
            action_args,
        });
    }

    Ok(actions)
}

// For a single struct, derive the code needed to implement the MatchParse trait
// for it.  Each field may carry a #[match_xlate(..)] attribute naming the
// pipeline field ("name") and its match kind ("type": lpm or ternary).  A field
// without a type is matched exactly.
#[proc_macro_derive(MatchParse, attributes(match_xlate))]
pub fn derive_match_xlate(
    input: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let name = input.ident;

    let f = match get_fields(&input.data, "match_xlate") {
        Ok(f) => f,
        Err(e) => return e.to_compile_error().into(),
    };

    let to_ir_all = get_match_to_ir_converters(&f);
    let from_ir_all = get_ir_to_match_converters(&name, &f);

    #[rustfmt::skip]
    let post = quote! {
        impl MatchParse for #name {
            fn key_to_ir(&self) -> aal::IrResult<aal::MatchData> {
		let mut fields = Vec::new();
		#to_ir_all
		Ok(aal::MatchData { fields })
	    }

            fn ir_to_key(a: &aal::MatchData) -> aal::IrResult<Self> {
		Ok( #from_ir_all )
	    }
	}
    };

    proc_macro::TokenStream::from(post)
}

// For an enum of actions, derive the code needed to implement the ActionParse
// trait for it.
#[proc_macro_derive(ActionParse, attributes(action_xlate))]
pub fn derive_action_xlate(
    input: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let enum_name = input.ident;

    // Parse the ActionParse enum to identify each action and its args
    let actions = match get_actions(&input.data, "action_xlate") {
        Ok(a) => a,
        Err(e) => return e.to_compile_error().into(),
    };

    // Iterate over all the possible actions for this table (as represented by
    // an ActionParse enum) and build the "match" code that converts an action
    // to the intermediate representation and back again.
    let mut to_ir_all = TokenStream::new();
    let mut from_ir_all = TokenStream::new();
    for a in &actions {
        to_ir_all.extend(get_action_to_ir_converter(&enum_name, a));
        from_ir_all.extend(get_ir_to_action_converter(&enum_name, a));
    }

    #[rustfmt::skip]
    let post = quote! {
	impl ActionParse for #enum_name {
            fn action_to_ir(&self) -> aal::IrResult<aal::ActionData> {
 	    	let action;
		let mut args = Vec::new();
		match self {
		    #to_ir_all
		};
		Ok( aal::ActionData { action: action.to_string(), args })
	    }

            fn ir_to_action(a: &aal::ActionData) -> aal::IrResult<Self> {
		match a.action.as_str() {
		    #from_ir_all
		    x => Err(aal::IrError::Internal(
			format!("found unknown action: {x}"))),
		}
	    }
	}
    };

    proc_macro::TokenStream::from(post)
}
