//! Function-definition driver (`spec.md` §4.10, component C10).
//!
//! Ties every earlier component together for one function body: builds the
//! function's own `TypeFunction` debug entry (richer than the plain type
//! entry C6 would have built, since it carries real parameter names and a
//! code range), binds parameters into a fresh `LocalScope`, lowers the body
//! through C7/C8, and attaches the result to the `IrIdentifier` C6 already
//! inserted for this function's name.
//!
//! Parameter and return types are run through the debug builder (which
//! itself queries target layout the same way C4 does) rather than through
//! `typetranslate::translate_object_type` a second time: that function
//! rejects `AstType::Function` outright, and neither `IrFunction` nor
//! `IrIdentifier` carries a field to keep a separately-registered
//! `TypeEntryId` around, so a standalone call would only leave unreferenced
//! rows in `module.types`.

use astir_ast::{AstType, BlockItem, ScopedIdentifier};
use astir_ir::debug::{DebugAttribute, DebugEntryKind};
use astir_ir::error::{Result, TranslateError};
use astir_ir::flow::FlowControlTree;
use astir_ir::id::FunctionIndex;
use astir_ir::module::IrFunction;
use astir_ir::IrModule;

use crate::config::TranslationConfig;
use crate::debugbuilder::DebugEntryBuilder;
use crate::exprlower::{ExprLowerCtx, LocalScope};
use crate::scopetranslate::mangled_name;
use crate::stmtlower::{lower_function_body, LabelTable};
use crate::target::TargetEnvironment;

/// One function definition ready for lowering: a scope entry (carrying the
/// function's own `AstType::Function` type and linkage decisions) together
/// with its already-resolved parameter list and body. Resolving K&R-style
/// parameter redeclarations is semantic analysis's job, not this driver's --
/// by the time a `FunctionDefinition` reaches here, `parameters` is the
/// final, merged list.
pub struct FunctionDefinition {
    pub identifier: ScopedIdentifier,
    pub parameters: Vec<(String, astir_ast::AstTypeRef)>,
    pub body: Vec<BlockItem>,
}

/// Lowers one function definition and records it in `module`.
///
/// `translate_global_scope` (C6) must already have run for this translation
/// unit: this driver looks up the function's `IrIdentifier` by its mangled
/// name to attach the function debug entry it builds here.
pub fn translate_function(
    def: &FunctionDefinition,
    module: &mut IrModule,
    target: &dyn TargetEnvironment,
    config: &TranslationConfig,
    debug: &mut DebugEntryBuilder,
) -> Result<FunctionIndex> {
    let function_ty = match def.identifier.ty.unqualified().as_ref() {
        AstType::Function(function_ty) => function_ty.clone(),
        _ => return Err(TranslateError::invalid_parameter("function definition's identifier is not a function type")),
    };

    let return_debug = debug.build_type(&function_ty.return_type, &mut module.debug_info, target, config)?;
    let function_debug_id = module.debug_info.push(DebugEntryKind::TypeFunction);
    {
        let entry = module.debug_info.get_mut(function_debug_id).expect("just pushed");
        entry.push_attribute(DebugAttribute::Name(def.identifier.name.clone()));
        entry.push_attribute(DebugAttribute::TypeRef(return_debug));
        entry.push_attribute(DebugAttribute::CodeBegin(0));
    }

    let mut flow = FlowControlTree::default();
    let mut locals = LocalScope::new(0);
    let mut labels = LabelTable::new();
    locals.push_block();

    for (name, ty) in &def.parameters {
        let slot = locals.alloc_scratch();
        locals.bind(name, slot, astir_ast::AstTypeRef::clone(ty));

        let param_debug = debug.build_type(ty, &mut module.debug_info, target, config)?;
        if let Some(binding) = locals.get_mut(name) {
            binding.debug_entry = Some(param_debug);
        }

        let param_entry_id = module.debug_info.push(DebugEntryKind::FunctionParameter);
        {
            let entry = module.debug_info.get_mut(param_entry_id).expect("just pushed");
            entry.push_attribute(DebugAttribute::Name(name.clone()));
            entry.push_attribute(DebugAttribute::TypeRef(param_debug));
        }
        module.debug_info.get_mut(function_debug_id).expect("still present").push_child(param_entry_id);
    }

    if function_ty.ellipsis {
        let vararg_id = module.debug_info.push(DebugEntryKind::FunctionVararg);
        module.debug_info.get_mut(function_debug_id).expect("still present").push_child(vararg_id);
    }

    let mut out = Vec::new();
    let mut ctx = ExprLowerCtx {
        module: &mut *module,
        target,
        config,
        flow: &mut flow,
        locals: &mut locals,
        debug: &mut *debug,
        labels: &mut labels,
    };
    let block_debug_entries = lower_function_body(&def.body, &mut ctx, &mut out)?;
    ctx.labels.finish()?;
    drop(ctx);

    let lexical_block_id = module.debug_info.push(DebugEntryKind::LexicalBlock);
    {
        let entry = module.debug_info.get_mut(lexical_block_id).expect("just pushed");
        for child in block_debug_entries {
            entry.push_child(child);
        }
    }
    module.debug_info.get_mut(function_debug_id).expect("still present").push_child(lexical_block_id);
    module
        .debug_info
        .get_mut(function_debug_id)
        .expect("still present")
        .push_attribute(DebugAttribute::CodeEnd(out.len() as u32));

    tracing::debug!(function = %def.identifier.name, instructions = out.len(), "lowered function body");

    let mut ir_function = IrFunction::new(FunctionIndex(module.functions.len() as u32));
    ir_function.body = out;
    let function_index = module.push_function(ir_function);

    let name = mangled_name(&def.identifier);
    let identifier = module
        .identifiers
        .get_mut(&name)
        .ok_or_else(|| TranslateError::NotFound { what: format!("function identifier `{name}`") })?;
    identifier.debug_entry = Some(function_debug_id);

    Ok(function_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use astir_ast::scope::Linkage;
    use astir_ast::{AstType, AstTypeRef, FunctionMode, FunctionType, ScopedId, StatementKind};
    use astir_ir::{IdentifierKind, IrScope, SymbolId, Visibility};
    use std::rc::Rc;

    fn int_ty() -> AstTypeRef {
        Rc::new(AstType::Int { signed: true })
    }

    fn function_identifier(name: &str, parameters: Vec<(Option<String>, Option<AstTypeRef>)>, ellipsis: bool) -> ScopedIdentifier {
        ScopedIdentifier {
            id: ScopedId(0),
            name: name.to_string(),
            ty: Rc::new(AstType::Function(FunctionType {
                return_type: int_ty(),
                mode: FunctionMode::Params,
                parameters,
                ellipsis,
            })),
            linkage: Linkage::External,
            is_thread_local: false,
            is_function: true,
            is_weak: false,
            is_common: false,
            visibility: None,
            asm_label: None,
            alias_target: None,
            initializer: None,
            is_definition: true,
            gnu_inline: false,
            extern_inline: false,
            owning_function: None,
            label_address_taken: false,
        }
    }

    fn seed_identifier(module: &mut IrModule, name: &str) {
        let symbol = module.symbols.intern(name);
        let mut identifier = astir_ir::IrIdentifier::new(symbol, IdentifierKind::Function, IrScope::Export);
        identifier.visibility = Visibility::Default;
        module.identifiers.insert(name.to_string(), identifier);
    }

    #[test]
    fn empty_function_body_still_produces_a_lexical_block_and_code_end() {
        let mut module = IrModule::new();
        seed_identifier(&mut module, "noop");
        let target = crate::target::DefaultTargetEnvironment::default();
        let config = TranslationConfig::default();
        let mut debug = DebugEntryBuilder::new();

        let def = FunctionDefinition {
            identifier: function_identifier("noop", Vec::new(), false),
            parameters: Vec::new(),
            body: Vec::new(),
        };

        let index = translate_function(&def, &mut module, &target, &config, &mut debug).unwrap();
        assert_eq!(index, FunctionIndex(0));
        assert_eq!(module.functions[0].body.len(), 0);

        let identifier = &module.identifiers["noop"];
        let function_debug = identifier.debug_entry.expect("function debug entry attached");
        let entry = module.debug_info.get(function_debug).unwrap();
        assert_eq!(entry.kind, DebugEntryKind::TypeFunction);
        assert!(entry.children.iter().any(|child| {
            module.debug_info.get(*child).unwrap().kind == DebugEntryKind::LexicalBlock
        }));
        assert!(entry.attributes.iter().any(|a| matches!(a, DebugAttribute::CodeEnd(0))));
    }

    #[test]
    fn parameters_are_bound_and_get_function_parameter_debug_children() {
        let mut module = IrModule::new();
        seed_identifier(&mut module, "add");
        let target = crate::target::DefaultTargetEnvironment::default();
        let config = TranslationConfig::default();
        let mut debug = DebugEntryBuilder::new();

        let def = FunctionDefinition {
            identifier: function_identifier(
                "add",
                vec![(Some("a".into()), Some(int_ty())), (Some("b".into()), Some(int_ty()))],
                false,
            ),
            parameters: vec![("a".to_string(), int_ty()), ("b".to_string(), int_ty())],
            body: vec![BlockItem::Statement(astir_ast::AstNode {
                kind: astir_ast::AstNodeKind::Statement(StatementKind::Return(None)),
                location: astir_ast::SourceLocation { line: 1, column: 1 },
                properties: astir_ast::NodeProperties {
                    category: None,
                    ty: None,
                    expression_props: None,
                    statement_props: Some(astir_ast::StatementProps::default()),
                    type_props: None,
                },
            })],
        };

        translate_function(&def, &mut module, &target, &config, &mut debug).unwrap();

        let identifier = &module.identifiers["add"];
        let function_debug = identifier.debug_entry.unwrap();
        let entry = module.debug_info.get(function_debug).unwrap();
        let param_children: Vec<_> = entry
            .children
            .iter()
            .filter(|child| module.debug_info.get(**child).unwrap().kind == DebugEntryKind::FunctionParameter)
            .collect();
        assert_eq!(param_children.len(), 2);
    }

    #[test]
    fn ellipsis_adds_a_function_vararg_debug_child() {
        let mut module = IrModule::new();
        seed_identifier(&mut module, "printf_like");
        let target = crate::target::DefaultTargetEnvironment::default();
        let config = TranslationConfig::default();
        let mut debug = DebugEntryBuilder::new();

        let def = FunctionDefinition {
            identifier: function_identifier("printf_like", vec![(Some("fmt".into()), Some(int_ty()))], true),
            parameters: vec![("fmt".to_string(), int_ty())],
            body: Vec::new(),
        };

        translate_function(&def, &mut module, &target, &config, &mut debug).unwrap();

        let identifier = &module.identifiers["printf_like"];
        let function_debug = identifier.debug_entry.unwrap();
        let entry = module.debug_info.get(function_debug).unwrap();
        assert!(entry.children.iter().any(|child| {
            module.debug_info.get(*child).unwrap().kind == DebugEntryKind::FunctionVararg
        }));
    }

    #[test]
    fn missing_identifier_is_reported_as_not_found() {
        let mut module = IrModule::new();
        let target = crate::target::DefaultTargetEnvironment::default();
        let config = TranslationConfig::default();
        let mut debug = DebugEntryBuilder::new();

        let def = FunctionDefinition {
            identifier: function_identifier("ghost", Vec::new(), false),
            parameters: Vec::new(),
            body: Vec::new(),
        };

        let err = translate_function(&def, &mut module, &target, &config, &mut debug).unwrap_err();
        assert!(matches!(err, TranslateError::NotFound { .. }));
    }
}
