//! GNU inline assembly lowering (`spec.md` §4.9, component C9).
//!
//! An `asm` statement's operand list carries GCC-style constraint strings
//! (`"=r"`, `"+m"`, `"r"`, ...) rather than a resolved storage class. Each
//! output's first character fixes its `AsmIoKind` (`+` read-write, `=`
//! write-only); the remaining characters and an input's whole constraint
//! classify into `Register`/`Memory`/`RegisterMemory`. Stack-slot indices are
//! pre-computed rather than handed out through `LocalScope`: outputs occupy
//! the first `|outputs|` slots in order, inputs continue the same counter,
//! and `long double` operands consume two slots instead of one. Output
//! operands translate their expression as an lvalue (so the result can be
//! written back after the instruction); inputs translate as rvalues.

use astir_ast::{AstType, AstTypeRef, InlineAssemblyNode};
use astir_ir::error::Result;
use astir_ir::module::{AsmIoKind, AsmLocationClass, AsmParameter, InlineAsmDescriptor};
use astir_ir::opcode::{IrInstruction, Opcode, Operand};

use crate::exprlower::{emit_load, emit_store, lower_expression, lower_lvalue, ExprLowerCtx};

fn is_long_double(ty: &AstTypeRef) -> bool {
    matches!(ty.unqualified().as_ref(), AstType::LongDouble)
}

fn slot_width(ty: &AstTypeRef) -> u32 {
    if is_long_double(ty) {
        2
    } else {
        1
    }
}

fn classify_location(letters: &str) -> AsmLocationClass {
    let has_register = letters.contains('r');
    let has_memory = letters.contains('m');
    if has_register && has_memory {
        AsmLocationClass::RegisterMemory
    } else if has_register {
        AsmLocationClass::Register
    } else if has_memory {
        AsmLocationClass::Memory
    } else {
        AsmLocationClass::RegisterMemory
    }
}

fn parse_output_constraint(constraint: &str) -> (AsmIoKind, AsmLocationClass) {
    let mut chars = constraint.chars();
    let io_kind = match chars.next() {
        Some('+') => AsmIoKind::LoadStore,
        _ => AsmIoKind::Store,
    };
    (io_kind, classify_location(chars.as_str()))
}

fn parse_input_constraint(constraint: &str) -> (AsmIoKind, AsmLocationClass) {
    (AsmIoKind::Read, classify_location(constraint))
}

pub(crate) fn lower_inline_asm(
    asm: &InlineAssemblyNode,
    ctx: &mut ExprLowerCtx,
    out: &mut Vec<IrInstruction>,
) -> Result<()> {
    let mut next_id = 0u32;
    let mut next_slot = 0u32;
    let mut outputs = Vec::with_capacity(asm.outputs.len());
    let mut writebacks = Vec::new();

    for operand in &asm.outputs {
        let (io_kind, location) = parse_output_constraint(&operand.constraint);
        let ty = lower_lvalue(&operand.operand, ctx, out)?;
        let addr_slot = ctx.locals.alloc_scratch();
        out.push(IrInstruction::new(Opcode::SetLocal, Operand::LocalSlot(addr_slot)));

        let stack_slot = next_slot;
        next_slot += slot_width(&ty);

        if matches!(io_kind, AsmIoKind::LoadStore) {
            out.push(IrInstruction::new(Opcode::GetLocal, Operand::LocalSlot(addr_slot)));
            emit_load(&ty, ctx, out);
            out.push(IrInstruction::new(Opcode::SetLocal, Operand::LocalSlot(stack_slot)));
        }

        outputs.push(AsmParameter {
            id: next_id,
            alias: operand.alias.clone(),
            io_kind,
            location,
            stack_slot,
        });
        next_id += 1;
        writebacks.push((addr_slot, stack_slot, ty));
    }

    let mut inputs = Vec::with_capacity(asm.inputs.len());
    for operand in &asm.inputs {
        let (io_kind, location) = parse_input_constraint(&operand.constraint);
        let ty = lower_expression(&operand.operand, ctx, out)?;
        let stack_slot = next_slot;
        next_slot += slot_width(&ty);
        out.push(IrInstruction::new(Opcode::SetLocal, Operand::LocalSlot(stack_slot)));

        inputs.push(AsmParameter {
            id: next_id,
            alias: operand.alias.clone(),
            io_kind,
            location,
            stack_slot,
        });
        next_id += 1;
    }

    let descriptor = InlineAsmDescriptor {
        template: asm.template.clone(),
        outputs,
        inputs,
        clobbers: asm.clobbers.clone(),
        jump_labels: asm.jump_labels.clone(),
    };
    let id = ctx.module.push_inline_asm(descriptor);
    out.push(IrInstruction::new(Opcode::InlineAsm(id), Operand::None));

    for (addr_slot, stack_slot, ty) in writebacks {
        out.push(IrInstruction::new(Opcode::GetLocal, Operand::LocalSlot(addr_slot)));
        out.push(IrInstruction::new(Opcode::GetLocal, Operand::LocalSlot(stack_slot)));
        emit_store(&ty, ctx, out);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use astir_ast::{
        AsmOperand, AstNode, AstNodeKind, ExpressionCategory, ExpressionKind, ExpressionProps,
        NodeProperties, SourceLocation,
    };
    use astir_ir::flow::FlowControlTree;
    use astir_ir::module::IrModule;
    use std::rc::Rc;

    fn int_ty() -> astir_ast::AstTypeRef {
        Rc::new(astir_ast::AstType::Int { signed: true })
    }

    fn loc() -> SourceLocation {
        SourceLocation { line: 1, column: 1 }
    }

    fn identifier(name: &str) -> astir_ast::NodeRef {
        Rc::new(AstNode {
            kind: AstNodeKind::Expression(ExpressionKind::Identifier(name.to_string())),
            location: loc(),
            properties: NodeProperties {
                category: Some(ExpressionCategory::Lvalue),
                ty: Some(int_ty()),
                expression_props: Some(ExpressionProps::default()),
                statement_props: None,
                type_props: None,
            },
        })
    }

    #[test]
    fn plain_register_input_is_read_class() {
        assert_eq!(parse_input_constraint("r"), (AsmIoKind::Read, AsmLocationClass::Register));
    }

    #[test]
    fn equals_r_is_write_only_register_output() {
        assert_eq!(parse_output_constraint("=r"), (AsmIoKind::Store, AsmLocationClass::Register));
    }

    #[test]
    fn plus_m_is_read_write_memory_output() {
        assert_eq!(parse_output_constraint("+m"), (AsmIoKind::LoadStore, AsmLocationClass::Memory));
    }

    #[test]
    fn rm_constraint_accepts_either_location() {
        assert_eq!(parse_output_constraint("=rm"), (AsmIoKind::Store, AsmLocationClass::RegisterMemory));
        assert_eq!(parse_input_constraint("rm"), (AsmIoKind::Read, AsmLocationClass::RegisterMemory));
    }

    #[test]
    fn long_double_operand_consumes_two_stack_slots() {
        assert_eq!(slot_width(&Rc::new(AstType::LongDouble)), 2);
        assert_eq!(slot_width(&int_ty()), 1);
    }

    #[test]
    fn lowering_pushes_a_descriptor_and_an_inline_asm_instruction() {
        let mut module = IrModule::new();
        let target = crate::target::DefaultTargetEnvironment::default();
        let config = crate::config::TranslationConfig::default();
        let mut flow = FlowControlTree::default();
        let mut locals = crate::exprlower::LocalScope::new(0);
        locals.push_block();
        let mut debug = crate::debugbuilder::DebugEntryBuilder::new();
        let mut labels = crate::stmtlower::LabelTable::new();

        let mut ctx = ExprLowerCtx {
            module: &mut module,
            target: &target,
            config: &config,
            flow: &mut flow,
            locals: &mut locals,
            debug: &mut debug,
            labels: &mut labels,
        };
        ctx.locals.bind("x", ctx.locals.alloc_scratch(), int_ty());

        let asm = InlineAssemblyNode {
            template: "nop".to_string(),
            outputs: vec![AsmOperand {
                alias: None,
                constraint: "=r".to_string(),
                operand: identifier("x"),
            }],
            inputs: Vec::new(),
            clobbers: vec!["memory".to_string()],
            jump_labels: Vec::new(),
        };

        let mut out = Vec::new();
        lower_inline_asm(&asm, &mut ctx, &mut out).unwrap();

        assert!(out.iter().any(|instr| matches!(instr.opcode, Opcode::InlineAsm(_))));
        assert_eq!(module.inline_assemblies.len(), 1);
        assert_eq!(module.inline_assemblies[0].outputs.len(), 1);
        assert_eq!(module.inline_assemblies[0].outputs[0].stack_slot, 0);
        assert_eq!(module.inline_assemblies[0].clobbers, vec!["memory".to_string()]);
    }

    #[test]
    fn input_slots_continue_after_output_slots() {
        let mut module = IrModule::new();
        let target = crate::target::DefaultTargetEnvironment::default();
        let config = crate::config::TranslationConfig::default();
        let mut flow = FlowControlTree::default();
        let mut locals = crate::exprlower::LocalScope::new(0);
        locals.push_block();
        let mut debug = crate::debugbuilder::DebugEntryBuilder::new();
        let mut labels = crate::stmtlower::LabelTable::new();

        let mut ctx = ExprLowerCtx {
            module: &mut module,
            target: &target,
            config: &config,
            flow: &mut flow,
            locals: &mut locals,
            debug: &mut debug,
            labels: &mut labels,
        };
        ctx.locals.bind("x", ctx.locals.alloc_scratch(), int_ty());
        ctx.locals.bind("y", ctx.locals.alloc_scratch(), int_ty());

        let asm = InlineAssemblyNode {
            template: "nop".to_string(),
            outputs: vec![AsmOperand {
                alias: None,
                constraint: "=r".to_string(),
                operand: identifier("x"),
            }],
            inputs: vec![AsmOperand {
                alias: None,
                constraint: "r".to_string(),
                operand: identifier("y"),
            }],
            clobbers: Vec::new(),
            jump_labels: Vec::new(),
        };

        let mut out = Vec::new();
        lower_inline_asm(&asm, &mut ctx, &mut out).unwrap();

        let descriptor = &module.inline_assemblies[0];
        assert_eq!(descriptor.outputs[0].stack_slot, 0);
        assert_eq!(descriptor.inputs[0].stack_slot, 1);
        assert_eq!(descriptor.inputs[0].id, 1);
    }
}
