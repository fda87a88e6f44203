//! Declarations of the variables and functions an environment exposes.

use serde::Serialize;

use super::types::Type;
use crate::engine::dispatch::Implementation;

/// A named, typed variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
}

impl VariableDecl {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// One typed signature of a function.
///
/// For receiver-style overloads the receiver is the first entry of `params`.
#[derive(Debug, Clone, Serialize)]
pub struct OverloadDecl {
    pub id: String,
    pub member: bool,
    pub params: Vec<Type>,
    pub result: Type,
    #[serde(skip)]
    pub implementation: Option<Implementation>,
}

impl OverloadDecl {
    /// A global overload: `f(params...)`.
    pub fn global(id: &str, params: Vec<Type>, result: Type) -> Self {
        Self {
            id: id.to_owned(),
            member: false,
            params,
            result,
            implementation: None,
        }
    }

    /// A receiver-style overload: `params[0].f(params[1..]...)`.
    pub fn member(id: &str, params: Vec<Type>, result: Type) -> Self {
        Self {
            member: true,
            ..Self::global(id, params, result)
        }
    }

    #[must_use]
    pub fn with_impl(mut self, implementation: Implementation) -> Self {
        self.implementation = Some(implementation);
        self
    }
}

/// A function together with its overloads.
///
/// A `singleton` implementation, when present, handles every overload at
/// runtime and takes precedence over per-overload implementations.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDecl {
    pub name: String,
    pub overloads: Vec<OverloadDecl>,
    #[serde(skip)]
    pub singleton: Option<Implementation>,
}

impl FunctionDecl {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            overloads: Vec::new(),
            singleton: None,
        }
    }

    #[must_use]
    pub fn overload(mut self, overload: OverloadDecl) -> Self {
        self.overloads.push(overload);
        self
    }

    #[must_use]
    pub fn with_singleton(mut self, implementation: Implementation) -> Self {
        self.singleton = Some(implementation);
        self
    }

    /// Restrict the declaration to the overloads whose ids are listed.
    ///
    /// Returns `None` when no overload survives.
    pub fn subset(&self, ids: &[&str]) -> Option<Self> {
        let overloads: Vec<_> = self
            .overloads
            .iter()
            .filter(|o| ids.contains(&o.id.as_str()))
            .cloned()
            .collect();
        if overloads.is_empty() {
            return None;
        }
        Some(Self {
            name: self.name.clone(),
            overloads,
            singleton: self.singleton,
        })
    }

    /// Look up an overload by id.
    pub fn find_overload(&self, id: &str) -> Option<&OverloadDecl> {
        self.overloads.iter().find(|o| o.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size() -> FunctionDecl {
        FunctionDecl::new("size")
            .overload(OverloadDecl::global("size_string", vec![Type::String], Type::Int))
            .overload(OverloadDecl::member("string_size", vec![Type::String], Type::Int))
            .overload(OverloadDecl::global(
                "size_list",
                vec![Type::list(Type::param("A"))],
                Type::Int,
            ))
    }

    #[test]
    fn subset_keeps_listed_overloads() {
        let decl = size().subset(&["size_string"]).unwrap();
        assert_eq!(decl.overloads.len(), 1);
        assert_eq!(decl.overloads[0].id, "size_string");
        assert!(!decl.overloads[0].member);
    }

    #[test]
    fn subset_of_nothing_is_none() {
        assert!(size().subset(&["map_size"]).is_none());
    }

    #[test]
    fn member_overloads() {
        let decl = size();
        assert!(decl.find_overload("string_size").unwrap().member);
        assert!(decl.find_overload("missing").is_none());
    }
}
