//! Scope-entry shapes consumed by the scope translator (C6). These describe
//! what the semantic analyzer has already decided about an identifier; the
//! translator only maps them onto IR identifiers, it never re-derives them.

use serde::{Deserialize, Serialize};

use crate::node::{Initializer, ScopedId, VisibilityAttr};
use crate::types::AstTypeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Linkage {
    External,
    Internal,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopedIdentifier {
    pub id: ScopedId,
    pub name: String,
    pub ty: AstTypeRef,
    pub linkage: Linkage,
    pub is_thread_local: bool,
    pub is_function: bool,
    pub is_weak: bool,
    pub is_common: bool,
    pub visibility: Option<VisibilityAttr>,
    pub asm_label: Option<String>,
    pub alias_target: Option<String>,
    pub initializer: Option<Initializer>,
    pub is_definition: bool,
    pub gnu_inline: bool,
    pub extern_inline: bool,
    /// `Some(function_name)` for a function-local `static` object; these are
    /// mangled as `<function>_<identifier>_<uniq>` and initialized against
    /// the owning function's ordinary scope.
    pub owning_function: Option<String>,
    pub label_address_taken: bool,
}

/// The four-pass ordering C6 walks the global scope in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalScopePass {
    Externals,
    StaticObjects,
    ExternalThreadLocals,
    StaticThreadLocals,
}

impl GlobalScopePass {
    pub const ORDER: [GlobalScopePass; 4] = [
        GlobalScopePass::Externals,
        GlobalScopePass::StaticObjects,
        GlobalScopePass::ExternalThreadLocals,
        GlobalScopePass::StaticThreadLocals,
    ];

    pub fn matches(self, entry: &ScopedIdentifier) -> bool {
        match self {
            GlobalScopePass::Externals => {
                !entry.is_thread_local && entry.linkage == Linkage::External && !entry.is_definition
            }
            GlobalScopePass::StaticObjects => !entry.is_thread_local && entry.owning_function.is_none(),
            GlobalScopePass::ExternalThreadLocals => {
                entry.is_thread_local && entry.linkage == Linkage::External && !entry.is_definition
            }
            GlobalScopePass::StaticThreadLocals => entry.is_thread_local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AstType;
    use std::rc::Rc;

    fn entry(linkage: Linkage, thread_local: bool) -> ScopedIdentifier {
        ScopedIdentifier {
            id: ScopedId(0),
            name: "a".into(),
            ty: Rc::new(AstType::Int { signed: true }),
            linkage,
            is_thread_local: thread_local,
            is_function: false,
            is_weak: false,
            is_common: false,
            visibility: None,
            asm_label: None,
            alias_target: None,
            initializer: None,
            is_definition: false,
            gnu_inline: false,
            extern_inline: false,
            owning_function: None,
            label_address_taken: false,
        }
    }

    #[test]
    fn external_declaration_matches_externals_pass() {
        let e = entry(Linkage::External, false);
        assert!(GlobalScopePass::Externals.matches(&e));
        assert!(!GlobalScopePass::ExternalThreadLocals.matches(&e));
    }

    #[test]
    fn thread_local_matches_static_thread_locals_pass() {
        let mut e = entry(Linkage::Internal, true);
        e.is_definition = true;
        assert!(GlobalScopePass::StaticThreadLocals.matches(&e));
        assert!(!GlobalScopePass::StaticObjects.matches(&e));
    }

    #[test]
    fn pass_order_is_four_passes() {
        assert_eq!(GlobalScopePass::ORDER.len(), 4);
    }
}
