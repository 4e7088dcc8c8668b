//! Scope translator (`spec.md` §4.6, component C6).
//!
//! Consumes `ScopedIdentifier`s already decided by the semantic analyzer
//! (this module never re-derives linkage or merges redeclarations, it only
//! maps one decision record onto one IR identifier) and walks them through
//! `GlobalScopePass::ORDER`'s four passes, materializing data objects and
//! debug type entries as it goes.

use astir_ast::{GlobalScopePass, Initializer, Linkage, ScopedIdentifier, VisibilityAttr};
use astir_ir::error::Result;
use astir_ir::{
    CommonProps, IdentifierKind, IrIdentifier, IrModule, IrScope, NamedData, StorageKind,
    Visibility,
};

use crate::config::TranslationConfig;
use crate::constexpr::{evaluate, EvalContext};
use crate::debugbuilder::DebugEntryBuilder;
use crate::target::TargetEnvironment;

/// Runs all four global-scope passes over `entries`, in `GlobalScopePass`
/// order, declaring an IR identifier (and, where applicable, a data object
/// and debug type entry) for each.
pub fn translate_global_scope(
    entries: &[ScopedIdentifier],
    module: &mut IrModule,
    target: &dyn TargetEnvironment,
    config: &TranslationConfig,
    debug: &mut DebugEntryBuilder,
) -> Result<()> {
    // Address-taken labels carry `owning_function`, which excludes them from
    // every `GlobalScopePass` (those passes only walk file-scope and static
    // storage); declare their IR symbols in a pass of their own first.
    for entry in entries.iter().filter(|entry| entry.label_address_taken) {
        translate_global_identifier(entry, module, target, config, debug)?;
    }
    for pass in GlobalScopePass::ORDER {
        for entry in entries.iter().filter(|entry| pass.matches(entry)) {
            translate_global_identifier(entry, module, target, config, debug)?;
        }
    }
    tracing::debug!(identifiers = entries.len(), "translated global scope");
    Ok(())
}

fn translate_global_identifier(
    entry: &ScopedIdentifier,
    module: &mut IrModule,
    target: &dyn TargetEnvironment,
    config: &TranslationConfig,
    debug: &mut DebugEntryBuilder,
) -> Result<()> {
    if entry.label_address_taken {
        // A label whose address is taken becomes its own IR function symbol
        // with local scope, distinct from the block it sits inside.
        let symbol_name = mangled_name(entry);
        let symbol = module.symbols.intern(&symbol_name);
        let identifier = IrIdentifier::new(symbol, IdentifierKind::Function, IrScope::Local);
        module.identifiers.insert(symbol_name, identifier);
        return Ok(());
    }

    let symbol_name = mangled_name(entry);
    let symbol = module.symbols.intern(&symbol_name);
    let kind = identifier_kind(entry);
    let scope = identifier_scope(entry);

    let mut identifier = IrIdentifier::new(symbol, kind, scope);
    identifier.visibility = identifier_visibility(entry);
    identifier.alias = entry
        .alias_target
        .as_deref()
        .map(|target_name| module.symbols.intern(target_name));

    if let Some(common) = common_props(entry, target, config) {
        identifier.common = true;
        identifier.common_props = Some(common);
    } else if entry.is_definition && !entry.is_function {
        materialize_object(entry, &symbol_name, module, target, config)?;
    }

    if !entry.is_function {
        let debug_entry = debug.build_type(&entry.ty, &mut module.debug_info, target, config)?;
        identifier.debug_entry = Some(debug_entry);
    }

    module.identifiers.insert(symbol_name.clone(), identifier);

    if entry.is_function && entry.extern_inline && entry.gnu_inline && config.gnu_inline_semantics {
        emit_gnu_inline_copy(&symbol_name, module);
    }

    Ok(())
}

/// `<function>_<identifier>_<uniq>` for function-local statics (`uniq` is
/// the analyzer-assigned `ScopedId`, already unique per translation unit);
/// the `asm` label override otherwise takes precedence over the plain name.
pub(crate) fn mangled_name(entry: &ScopedIdentifier) -> String {
    if let Some(owner) = &entry.owning_function {
        format!("{}_{}_{}", owner, entry.name, entry.id.0)
    } else if let Some(label) = &entry.asm_label {
        label.clone()
    } else {
        entry.name.clone()
    }
}

fn identifier_kind(entry: &ScopedIdentifier) -> IdentifierKind {
    if entry.is_function {
        IdentifierKind::Function
    } else if entry.is_thread_local {
        IdentifierKind::ThreadLocalData
    } else {
        IdentifierKind::GlobalData
    }
}

fn identifier_scope(entry: &ScopedIdentifier) -> IrScope {
    if entry.alias_target.is_some() || entry.is_weak {
        return IrScope::ExportWeak;
    }
    match entry.linkage {
        Linkage::External => {
            if entry.is_definition {
                IrScope::Export
            } else {
                IrScope::Import
            }
        }
        Linkage::Internal | Linkage::None => IrScope::Local,
    }
}

/// Visibility is only meaningful on function *definitions*; everything else
/// keeps the platform default.
fn identifier_visibility(entry: &ScopedIdentifier) -> Visibility {
    if !(entry.is_function && entry.is_definition) {
        return Visibility::Default;
    }
    match entry.visibility {
        None | Some(VisibilityAttr::Default) => Visibility::Default,
        Some(VisibilityAttr::Hidden) => Visibility::Hidden,
        Some(VisibilityAttr::Internal) => Visibility::Internal,
        Some(VisibilityAttr::Protected) => Visibility::Protected,
    }
}

fn common_props(
    entry: &ScopedIdentifier,
    target: &dyn TargetEnvironment,
    config: &TranslationConfig,
) -> Option<CommonProps> {
    if !entry.is_common || entry.is_weak || entry.initializer.is_some() {
        return None;
    }
    if entry.linkage == Linkage::External {
        return None;
    }
    let ctx = EvalContext { target, config };
    let size = crate::constexpr::size_of(&entry.ty, &ctx);
    let alignment = crate::typetranslate::alignment_hint(&entry.ty, target, config);
    Some(CommonProps { size, alignment })
}

fn materialize_object(
    entry: &ScopedIdentifier,
    symbol_name: &str,
    module: &mut IrModule,
    target: &dyn TargetEnvironment,
    config: &TranslationConfig,
) -> Result<()> {
    let values = match &entry.initializer {
        Some(init) => {
            let ctx = EvalContext { target, config };
            flatten_initializer(init, &ctx)?
        }
        None => Vec::new(),
    };
    let (type_id, _layout) =
        crate::typetranslate::translate_object_type(&entry.ty, module, target, config, false)?;
    let storage = if entry.is_thread_local {
        StorageKind::ThreadLocalStorage
    } else {
        StorageKind::GlobalStorage
    };
    module.named_data.insert(
        symbol_name.to_string(),
        NamedData {
            storage,
            type_id,
            initializer_values: values,
        },
    );
    Ok(())
}

/// Flattens a (possibly nested) initializer into the leaf `ConstValue`
/// sequence `NamedData` stores, in declaration order. Designators are not
/// re-targeted here: the analyzer has already normalized designated entries
/// into positional order before handing the tree to the translator.
fn flatten_initializer(init: &Initializer, ctx: &EvalContext) -> Result<Vec<astir_ir::ConstValue>> {
    match init {
        Initializer::Expression(node) => Ok(vec![evaluate(node, ctx)?]),
        Initializer::List(entries) => {
            let mut values = Vec::new();
            for entry in entries {
                values.extend(flatten_initializer(&entry.value, ctx)?);
            }
            Ok(values)
        }
    }
}

/// An `extern inline` function under GNU-inline semantics additionally
/// surfaces as a second, locally-scoped symbol: the back-end compiles the
/// body once but the caller-visible declaration stays `Import`-shaped while
/// a private copy is kept around for inlining decisions. The function body
/// itself is wired up later, by whichever of C10's passes emits it under
/// both names.
fn emit_gnu_inline_copy(primary_name: &str, module: &mut IrModule) {
    let alias_name = format!("{}.gnu_inline_copy", primary_name);
    let alias_symbol = module.symbols.intern(&alias_name);
    let identifier = IrIdentifier::new(alias_symbol, IdentifierKind::Function, IrScope::Local);
    module.identifiers.insert(alias_name, identifier);
}
