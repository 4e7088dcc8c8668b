//! Statement lowering (`spec.md` §4.8, component C8).
//!
//! Every structural statement pushes a `FlowControlTree` node on entry and
//! pops it on exit, mirroring the AST's own block nesting; `break`/`continue`
//! never search the AST, they resolve against whatever the tree's innermost
//! node currently is. `switch` has no dispatch opcode of its own, so it
//! lowers to an explicit compare chain placed after its body; computed
//! `goto` reuses the same label-patching bookkeeping as ordinary `goto`,
//! through `Opcode::LabelAddress`/`Opcode::IndirectJump`.
//!
//! A compound statement that declares a variable-length array pushes a
//! `FlowControlNode::Block` on entry and, if it ends up holding any VLAs,
//! emits exactly one `Opcode::ScopePop` on exit (`spec.md` Invariant 4).

use std::rc::Rc;

use astir_ast::{
    ArrayBoundary, AstNode, AstNodeKind, AstType, AstTypeRef, BlockItem, Declaration, Designator,
    Initializer, StatementKind, StorageClass, VlaSize,
};
use astir_ir::constval::ConstValue;
use astir_ir::debug::DebugEntryId;
use astir_ir::error::{Result, SourceLocation, TranslateError};
use astir_ir::flow::{FlowControlNode, PatchList, VlaElement};
use astir_ir::id::{FlowControlId, InstructionIndex};
use astir_ir::opcode::{
    ArithKind, BoolOp, CompareKind, IntWidth, IrInstruction, Opcode, Operand, Signedness,
};

use crate::constexpr;
use crate::exprlower::{
    arith_width, discard_top, emit_offset, emit_store, emit_typeconv, lower_expression, ExprLowerCtx,
};
use crate::inlineasm::lower_inline_asm;

/// Whole-function label/goto bookkeeping. A function owns exactly one of
/// these (shared through `ExprLowerCtx::labels` even into nested GNU
/// statement expressions, since a `goto` can cross a statement-expression
/// boundary but never a function boundary).
#[derive(Debug, Default)]
pub struct LabelTable {
    resolved: std::collections::HashMap<String, u32>,
    pending: std::collections::HashMap<String, Vec<usize>>,
}

impl LabelTable {
    pub fn new() -> Self {
        LabelTable::default()
    }

    /// Records a label's position and patches every `goto` that referenced
    /// it before this point was known.
    pub fn place_label(&mut self, name: &str, position: u32, out: &mut [IrInstruction]) {
        self.resolved.insert(name.to_string(), position);
        if let Some(pending) = self.pending.remove(name) {
            for idx in pending {
                out[idx].operand = Operand::TargetIndex(position);
            }
        }
    }

    /// Patches `out[jump_idx]` immediately if `name` has already been
    /// placed, otherwise queues it for `place_label` to patch later.
    pub fn goto(&mut self, name: &str, jump_idx: usize, out: &mut [IrInstruction]) {
        if let Some(&position) = self.resolved.get(name) {
            out[jump_idx].operand = Operand::TargetIndex(position);
        } else {
            self.pending.entry(name.to_string()).or_default().push(jump_idx);
        }
    }

    /// Every function must call this once its body is fully lowered
    /// (`spec.md` Invariant 3: no unresolved branch target survives
    /// finalization). A name still pending means a `goto` referenced a
    /// label the function never defines.
    pub fn finish(&self) -> Result<()> {
        if let Some(name) = self.pending.keys().next() {
            return Err(TranslateError::NotFound {
                what: format!("label `{name}`"),
            });
        }
        Ok(())
    }
}

fn patch_list_to(out: &mut [IrInstruction], list: &PatchList, target: u32) {
    for index in &list.targets {
        out[index.0 as usize].operand = Operand::TargetIndex(target);
    }
}

pub fn lower_block_items(items: &[BlockItem], ctx: &mut ExprLowerCtx, out: &mut Vec<IrInstruction>) -> Result<()> {
    ctx.locals.push_block();
    let flow_id = ctx.flow.push(FlowControlNode::new_block());
    for item in items {
        lower_block_item(item, ctx, out)?;
    }
    finish_block(flow_id, ctx, out);
    ctx.locals.pop_block();
    Ok(())
}

/// Lowers a function's top-level block, returning the debug entries
/// attached to whatever locals it declares directly (not in a further
/// nested block). The function driver parents those under a lexical-block
/// debug entry; the returned list is only available before this scope's
/// frame closes, so this cannot be expressed as a plain `lower_block_items`
/// call followed by a lookup.
pub fn lower_function_body(
    items: &[BlockItem],
    ctx: &mut ExprLowerCtx,
    out: &mut Vec<IrInstruction>,
) -> Result<Vec<DebugEntryId>> {
    ctx.locals.push_block();
    let flow_id = ctx.flow.push(FlowControlNode::new_block());
    for item in items {
        lower_block_item(item, ctx, out)?;
    }
    let debug_entries = ctx.locals.current_frame_debug_entries();
    finish_block(flow_id, ctx, out);
    ctx.locals.pop_block();
    Ok(debug_entries)
}

/// Closes a structural block's flow-control node, emitting exactly one
/// `Opcode::ScopePop` if it ended up holding any variable-length arrays
/// (`spec.md` Invariant 4). This is the fall-through exit; `break`, `continue`
/// and `return` leave early and pop their own VLA-bearing blocks through
/// `emit_vla_scope_pops_until` before jumping past this point, so this fall-
/// through pop is skipped when the block's last lowered instruction is
/// already a terminator -- otherwise a block ending in `return`/`break`/
/// `continue` would get a second, unreachable `ScopePop` behind it. A plain
/// `goto` out of a VLA-bearing block does not currently get a matching pop --
/// the label table has no notion of flow-control depth at the jump site.
fn finish_block(flow_id: FlowControlId, ctx: &mut ExprLowerCtx, out: &mut Vec<IrInstruction>) {
    let contains_vla = ctx
        .flow
        .get(flow_id)
        .map(|entry| entry.node.contains_vla())
        .unwrap_or(false);
    let already_left = out.last().map(|i| i.opcode.is_terminator()).unwrap_or(false);
    if contains_vla && !already_left {
        out.push(IrInstruction::new(Opcode::ScopePop, Operand::None));
    }
    ctx.flow.pop();
}

/// `break`/`continue`/`return` leave the current block through a jump rather
/// than `finish_block`'s fall-through, so they walk the flow-control chain
/// themselves and pop every VLA-bearing block between the current point and
/// `stop_at` (exclusive). `stop_at == None` walks all the way to the
/// function's outermost block, the case `return` needs.
fn emit_vla_scope_pops_until(ctx: &ExprLowerCtx, out: &mut Vec<IrInstruction>, stop_at: Option<FlowControlId>) {
    let mut current = ctx.flow.current();
    while let Some(id) = current {
        if Some(id) == stop_at {
            break;
        }
        let entry = ctx.flow.get(id).expect("flow id reached by walking the open chain is valid");
        if entry.node.contains_vla() {
            out.push(IrInstruction::new(Opcode::ScopePop, Operand::None));
        }
        current = entry.parent;
    }
}

fn lower_block_item(item: &BlockItem, ctx: &mut ExprLowerCtx, out: &mut Vec<IrInstruction>) -> Result<()> {
    match item {
        BlockItem::Statement(stmt) => lower_statement(stmt, ctx, out),
        BlockItem::Declaration(decl) => lower_declaration(decl, ctx, out),
    }
}

pub fn lower_statement(node: &AstNode, ctx: &mut ExprLowerCtx, out: &mut Vec<IrInstruction>) -> Result<()> {
    let AstNodeKind::Statement(kind) = &node.kind else {
        return Err(TranslateError::invalid_parameter("expected a statement node"));
    };

    match kind {
        StatementKind::Compound(items) => lower_block_items(items, ctx, out),
        StatementKind::Expression(expr) => {
            if let Some(expr) = expr {
                lower_expression(expr, ctx, out)?;
                discard_top(out);
            }
            Ok(())
        }
        StatementKind::If { condition, then_branch, else_branch } => {
            lower_if(condition, then_branch, else_branch.as_deref(), ctx, out)
        }
        StatementKind::Switch { discriminant, body } => lower_switch(discriminant, body, ctx, out),
        StatementKind::Case { value, body } => lower_case(value, body, node, ctx, out),
        StatementKind::Default(body) => lower_default(body, node, ctx, out),
        StatementKind::While { condition, body } => lower_while(condition, body, ctx, out),
        StatementKind::DoWhile { body, condition } => lower_do_while(body, condition, ctx, out),
        StatementKind::For { init, condition, step, body } => lower_for(init.as_deref(), condition.as_ref(), step.as_ref(), body, ctx, out),
        StatementKind::Goto(label) => {
            let idx = out.len();
            out.push(IrInstruction::new(Opcode::Jump, Operand::placeholder_target()));
            ctx.labels.goto(label, idx, out);
            Ok(())
        }
        StatementKind::IndirectGoto(target) => {
            lower_expression(target, ctx, out)?;
            out.push(IrInstruction::new(Opcode::IndirectJump, Operand::None));
            Ok(())
        }
        StatementKind::Break => {
            let id = ctx.flow.innermost_breakable().ok_or_else(|| {
                TranslateError::analysis_error(
                    SourceLocation { line: node.location.line, column: node.location.column },
                    "`break` outside a loop or switch",
                )
            })?;
            emit_vla_scope_pops_until(ctx, out, Some(id));
            let idx = out.len();
            out.push(IrInstruction::new(Opcode::Jump, Operand::placeholder_target()));
            let entry = ctx.flow.get_mut(id).expect("flow id returned by innermost_breakable is valid");
            entry.node.break_targets().expect("breakable node has a break list").push(InstructionIndex(idx as u32));
            Ok(())
        }
        StatementKind::Continue => {
            let id = ctx.flow.innermost_loop().ok_or_else(|| {
                TranslateError::analysis_error(
                    SourceLocation { line: node.location.line, column: node.location.column },
                    "`continue` outside a loop",
                )
            })?;
            emit_vla_scope_pops_until(ctx, out, Some(id));
            let idx = out.len();
            out.push(IrInstruction::new(Opcode::Jump, Operand::placeholder_target()));
            let entry = ctx.flow.get_mut(id).expect("flow id returned by innermost_loop is valid");
            entry.node.continue_targets().expect("loop node has a continue list").push(InstructionIndex(idx as u32));
            Ok(())
        }
        StatementKind::Return(value) => {
            if let Some(expr) = value {
                lower_expression(expr, ctx, out)?;
            }
            emit_vla_scope_pops_until(ctx, out, None);
            out.push(IrInstruction::new(Opcode::Return, Operand::None));
            Ok(())
        }
        StatementKind::Labeled { label, body } => {
            let position = out.len() as u32;
            ctx.labels.place_label(label, position, out);
            lower_statement(body, ctx, out)
        }
        StatementKind::InlineAsm(asm) => lower_inline_asm(asm, ctx, out),
    }
}

fn lower_if(
    condition: &AstNode,
    then_branch: &AstNode,
    else_branch: Option<&AstNode>,
    ctx: &mut ExprLowerCtx,
    out: &mut Vec<IrInstruction>,
) -> Result<()> {
    let cond_ty = lower_expression(condition, ctx, out)?;
    let (width, _) = arith_width(&cond_ty, ctx);
    out.push(IrInstruction::new(Opcode::IntToBool(width), Operand::None));
    let branch_idx = out.len();
    out.push(IrInstruction::new(Opcode::Branch(IntWidth::W32), Operand::placeholder_target()));

    lower_statement(then_branch, ctx, out)?;

    match else_branch {
        Some(else_node) => {
            let jump_idx = out.len();
            out.push(IrInstruction::new(Opcode::Jump, Operand::placeholder_target()));
            let else_start = out.len() as u32;
            out[branch_idx].operand = Operand::TargetIndex(else_start);
            lower_statement(else_node, ctx, out)?;
            let end = out.len() as u32;
            out[jump_idx].operand = Operand::TargetIndex(end);
        }
        None => {
            let end = out.len() as u32;
            out[branch_idx].operand = Operand::TargetIndex(end);
        }
    }
    Ok(())
}

/// `while (cond) body` -- the re-check point doubles as the `continue`
/// target, the fall-through past the loop is `break`'s.
fn lower_while(condition: &AstNode, body: &AstNode, ctx: &mut ExprLowerCtx, out: &mut Vec<IrInstruction>) -> Result<()> {
    let loop_id = ctx.flow.push(FlowControlNode::Loop {
        continue_patch_list: PatchList::default(),
        break_patch_list: PatchList::default(),
    });

    let cond_pos = out.len() as u32;
    let cond_ty = lower_expression(condition, ctx, out)?;
    let (width, _) = arith_width(&cond_ty, ctx);
    out.push(IrInstruction::new(Opcode::IntToBool(width), Operand::None));
    let branch_idx = out.len();
    out.push(IrInstruction::new(Opcode::Branch(IntWidth::W32), Operand::placeholder_target()));

    lower_statement(body, ctx, out)?;
    out.push(IrInstruction::new(Opcode::Jump, Operand::TargetIndex(cond_pos)));

    let end = out.len() as u32;
    out[branch_idx].operand = Operand::TargetIndex(end);
    finish_loop(loop_id, cond_pos, end, ctx, out);
    Ok(())
}

/// `do body while (cond)` -- the condition re-check sits at the bottom and
/// is `continue`'s target; a taken condition jumps back to the body's start.
fn lower_do_while(body: &AstNode, condition: &AstNode, ctx: &mut ExprLowerCtx, out: &mut Vec<IrInstruction>) -> Result<()> {
    let loop_id = ctx.flow.push(FlowControlNode::Loop {
        continue_patch_list: PatchList::default(),
        break_patch_list: PatchList::default(),
    });

    let body_start = out.len() as u32;
    lower_statement(body, ctx, out)?;

    let cond_pos = out.len() as u32;
    let cond_ty = lower_expression(condition, ctx, out)?;
    let (width, _) = arith_width(&cond_ty, ctx);
    out.push(IrInstruction::new(Opcode::IntToBool(width), Operand::None));
    let branch_idx = out.len();
    out.push(IrInstruction::new(Opcode::Branch(IntWidth::W32), Operand::placeholder_target()));
    out.push(IrInstruction::new(Opcode::Jump, Operand::TargetIndex(body_start)));

    let end = out.len() as u32;
    out[branch_idx].operand = Operand::TargetIndex(end);
    finish_loop(loop_id, cond_pos, end, ctx, out);
    Ok(())
}

/// `for (init; cond; step) body` -- `continue` targets `step`, not `cond`,
/// the one place this loop shape parts ways with `while`'s convention.
fn lower_for(
    init: Option<&BlockItem>,
    condition: Option<&AstNode>,
    step: Option<&AstNode>,
    body: &AstNode,
    ctx: &mut ExprLowerCtx,
    out: &mut Vec<IrInstruction>,
) -> Result<()> {
    ctx.locals.push_block();
    if let Some(init_item) = init {
        lower_block_item(init_item, ctx, out)?;
    }

    let for_id = ctx.flow.push(FlowControlNode::For {
        continue_patch_list: PatchList::default(),
        break_patch_list: PatchList::default(),
    });

    let cond_pos = out.len() as u32;
    let branch_idx = match condition {
        Some(cond) => {
            let cond_ty = lower_expression(cond, ctx, out)?;
            let (width, _) = arith_width(&cond_ty, ctx);
            out.push(IrInstruction::new(Opcode::IntToBool(width), Operand::None));
            let idx = out.len();
            out.push(IrInstruction::new(Opcode::Branch(IntWidth::W32), Operand::placeholder_target()));
            Some(idx)
        }
        None => None,
    };

    lower_statement(body, ctx, out)?;

    let step_pos = out.len() as u32;
    if let Some(step_expr) = step {
        lower_expression(step_expr, ctx, out)?;
        discard_top(out);
    }
    out.push(IrInstruction::new(Opcode::Jump, Operand::TargetIndex(cond_pos)));

    let end = out.len() as u32;
    if let Some(idx) = branch_idx {
        out[idx].operand = Operand::TargetIndex(end);
    }
    finish_loop(for_id, step_pos, end, ctx, out);
    ctx.locals.pop_block();
    Ok(())
}

/// Shared tail for every loop shape: patch `continue` to `continue_target`
/// and `break` to `end`, then close the loop's flow-control node.
fn finish_loop(loop_id: FlowControlId, continue_target: u32, end: u32, ctx: &mut ExprLowerCtx, out: &mut Vec<IrInstruction>) {
    let entry = ctx.flow.get_mut(loop_id).expect("loop id just pushed is valid");
    match &entry.node {
        FlowControlNode::Loop { continue_patch_list, break_patch_list } | FlowControlNode::For { continue_patch_list, break_patch_list } => {
            patch_list_to(out, continue_patch_list, continue_target);
            patch_list_to(out, break_patch_list, end);
        }
        _ => unreachable!("finish_loop only ever receives the id it just pushed"),
    }
    ctx.flow.pop();
}

/// `switch` has no dispatch opcode of its own: an unconditional jump skips
/// straight to the body, the body's `case`/`default` labels record their
/// position into the switch's flow-control node as they're reached, and a
/// compare-and-branch chain mirroring those entries runs after the body,
/// falling through to `default` (or past the switch, with none) when
/// nothing matches.
fn lower_switch(discriminant: &AstNode, body: &AstNode, ctx: &mut ExprLowerCtx, out: &mut Vec<IrInstruction>) -> Result<()> {
    let disc_ty = lower_expression(discriminant, ctx, out)?;
    let scratch = ctx.locals.alloc_scratch();
    out.push(IrInstruction::new(Opcode::SetLocal, Operand::LocalSlot(scratch)));

    let switch_id = ctx.flow.push(FlowControlNode::Switch {
        cases: Vec::new(),
        default_patch: None,
        break_patch_list: PatchList::default(),
    });

    let dispatch_jump_idx = out.len();
    out.push(IrInstruction::new(Opcode::Jump, Operand::placeholder_target()));

    lower_statement(body, ctx, out)?;

    let dispatch_start = out.len() as u32;
    out[dispatch_jump_idx].operand = Operand::TargetIndex(dispatch_start);

    let (cases, default_patch) = {
        let entry = ctx.flow.get(switch_id).expect("switch id just pushed is valid");
        match &entry.node {
            FlowControlNode::Switch { cases, default_patch, .. } => (cases.clone(), *default_patch),
            _ => unreachable!("lower_switch only ever reads the node it just pushed"),
        }
    };

    let (width, signedness) = arith_width(&disc_ty, ctx);
    for (value, case_target) in &cases {
        out.push(IrInstruction::new(Opcode::GetLocal, Operand::LocalSlot(scratch)));
        emit_case_const(value, out);
        out.push(IrInstruction::new(
            Opcode::IntCompare { width, signedness, kind: CompareKind::Equals },
            Operand::None,
        ));
        out.push(IrInstruction::new(Opcode::IntBool { width: IntWidth::W32, op: BoolOp::Not }, Operand::None));
        out.push(IrInstruction::new(Opcode::Branch(IntWidth::W32), Operand::TargetIndex(case_target.0)));
    }
    if let Some(default_target) = default_patch {
        out.push(IrInstruction::new(Opcode::Jump, Operand::TargetIndex(default_target.0)));
    }

    let end = out.len() as u32;
    let entry = ctx.flow.get_mut(switch_id).expect("switch id just pushed is valid");
    if let FlowControlNode::Switch { break_patch_list, .. } = &entry.node {
        patch_list_to(out, break_patch_list, end);
    }
    ctx.flow.pop();
    Ok(())
}

fn emit_case_const(value: &ConstValue, out: &mut Vec<IrInstruction>) {
    if let ConstValue::Integer { unsigned, .. } = value {
        out.push(IrInstruction::new(Opcode::UintConst, Operand::UImmediate(*unsigned)));
    }
}

fn lower_case(value: &AstNode, body: &AstNode, node: &AstNode, ctx: &mut ExprLowerCtx, out: &mut Vec<IrInstruction>) -> Result<()> {
    let location = SourceLocation { line: node.location.line, column: node.location.column };
    let switch_id = ctx
        .flow
        .innermost_switch()
        .ok_or_else(|| TranslateError::analysis_error(location, "`case` outside a switch"))?;
    let eval_ctx_target = ctx.target;
    let eval_ctx_config = ctx.config;
    let const_value = constexpr::evaluate(value, &crate::constexpr::EvalContext { target: eval_ctx_target, config: eval_ctx_config })?;
    let target = out.len() as u32;
    {
        let entry = ctx.flow.get_mut(switch_id).expect("innermost_switch returned a valid id");
        let FlowControlNode::Switch { cases, .. } = &mut entry.node else {
            unreachable!("innermost_switch only ever returns a Switch node");
        };
        if cases.iter().any(|(existing, _)| existing.value_equal(&const_value)) {
            return Err(TranslateError::analysis_error(location, "duplicate `case` value"));
        }
        cases.push((const_value, InstructionIndex(target)));
    }
    lower_statement(body, ctx, out)
}

fn lower_default(body: &AstNode, node: &AstNode, ctx: &mut ExprLowerCtx, out: &mut Vec<IrInstruction>) -> Result<()> {
    let location = SourceLocation { line: node.location.line, column: node.location.column };
    let switch_id = ctx
        .flow
        .innermost_switch()
        .ok_or_else(|| TranslateError::analysis_error(location, "`default` outside a switch"))?;
    let target = out.len() as u32;
    {
        let entry = ctx.flow.get_mut(switch_id).expect("innermost_switch returned a valid id");
        let FlowControlNode::Switch { default_patch, .. } = &mut entry.node else {
            unreachable!("innermost_switch only ever returns a Switch node");
        };
        if default_patch.is_some() {
            return Err(TranslateError::analysis_error(location, "duplicate `default` label"));
        }
        *default_patch = Some(InstructionIndex(target));
    }
    lower_statement(body, ctx, out)
}

/// Local variable declarations have no scope-entry id to key off of
/// (`Declaration` only carries a name), so this just hands out a fresh slot
/// and binds it by name for the rest of the enclosing block. `static`/
/// `extern`/`typedef` declarations carry no per-activation storage and are
/// (or will be) materialized by the scope translator instead; there is
/// nothing for this function to emit for them.
fn lower_declaration(decl: &Declaration, ctx: &mut ExprLowerCtx, out: &mut Vec<IrInstruction>) -> Result<()> {
    match decl.storage_class {
        StorageClass::Static | StorageClass::StaticThreadLocal | StorageClass::ExternThreadLocal | StorageClass::Extern | StorageClass::Typedef => {
            return Ok(());
        }
        StorageClass::None | StorageClass::Auto | StorageClass::Register | StorageClass::ThreadLocal => {}
    }

    if let AstType::Array { element, boundary: ArrayBoundary::Vla(size) | ArrayBoundary::VlaStatic(size) } =
        decl.ty.unqualified().as_ref()
    {
        return lower_vla_declaration(decl, element, size, ctx, out);
    }

    let slot = ctx.locals.alloc_scratch();
    ctx.locals.bind(&decl.identifier, slot, Rc::clone(&decl.ty));

    let debug_id = ctx.debug.build_type(&decl.ty, &mut ctx.module.debug_info, ctx.target, ctx.config)?;
    if let Some(binding) = ctx.locals.get_mut(&decl.identifier) {
        binding.debug_entry = Some(debug_id);
    }

    if let Some(initializer) = &decl.initializer {
        lower_initializer(slot, &decl.ty, initializer, ctx, out)?;
    }
    Ok(())
}

/// A VLA has no compile-time size, so its declaration's only work is
/// evaluating the element-count expression once (C's rule: a VLA's bound is
/// evaluated exactly once, at the point of declaration) and registering the
/// block as carrying a VLA so `finish_block`/`emit_vla_scope_pops_until`
/// know to emit `Opcode::ScopePop` on every path leaving it. The computed
/// byte length is stashed in the declaration's own slot; nothing downstream
/// of C8 performs the actual stack reservation, which is the back end's job.
fn lower_vla_declaration(
    decl: &Declaration,
    element: &AstTypeRef,
    size: &VlaSize,
    ctx: &mut ExprLowerCtx,
    out: &mut Vec<IrInstruction>,
) -> Result<()> {
    let slot = ctx.locals.alloc_scratch();
    ctx.locals.bind(&decl.identifier, slot, Rc::clone(&decl.ty));

    let debug_id = ctx.debug.build_type(&decl.ty, &mut ctx.module.debug_info, ctx.target, ctx.config)?;
    if let Some(binding) = ctx.locals.get_mut(&decl.identifier) {
        binding.debug_entry = Some(debug_id);
    }

    let count_ty = lower_expression(&size.0, ctx, out)?;
    let (width, signedness) = arith_width(&count_ty, ctx);
    let element_size = constexpr::size_of(element, &ctx.eval_ctx()) as i64;
    out.push(IrInstruction::new(Opcode::IntConst, Operand::Immediate(element_size)));
    out.push(IrInstruction::new(Opcode::IntArith { width, signedness, kind: ArithKind::Mul }, Operand::None));
    out.push(IrInstruction::new(Opcode::SetLocal, Operand::LocalSlot(slot)));

    let head_identifier = ctx.module.symbols.intern(&format!("{}.vla_head", decl.identifier));
    let flow_id = ctx.flow.current().expect("lower_declaration always runs inside an open block");
    let entry = ctx.flow.get_mut(flow_id).expect("current flow id is always valid");
    if let FlowControlNode::Block { vl_arrays, .. } = &mut entry.node {
        vl_arrays.push(VlaElement { head_identifier });
    }
    Ok(())
}

/// Initializes the object at `slot` (offset 0) according to `initializer`.
/// Scalars reuse the ordinary store path; aggregates walk their member/
/// element list positionally, honoring a leading designator on each entry.
fn lower_initializer(slot: u32, ty: &AstTypeRef, initializer: &Initializer, ctx: &mut ExprLowerCtx, out: &mut Vec<IrInstruction>) -> Result<()> {
    match initializer {
        Initializer::Expression(expr) => {
            out.push(IrInstruction::new(Opcode::GetLocal, Operand::LocalSlot(slot)));
            let rhs_ty = lower_expression(expr, ctx, out)?;
            emit_typeconv(&rhs_ty, ty, ctx, out);
            emit_store(ty, ctx, out);
            Ok(())
        }
        Initializer::List(entries) => lower_aggregate_initializer(slot, 0, ty, entries, ctx, out),
    }
}

fn lower_aggregate_initializer(
    base_slot: u32,
    base_offset: i64,
    ty: &AstTypeRef,
    entries: &[astir_ast::InitializerListEntry],
    ctx: &mut ExprLowerCtx,
    out: &mut Vec<IrInstruction>,
) -> Result<()> {
    let unqualified = ty.unqualified();
    match unqualified.as_ref() {
        AstType::Structure(record) | AstType::Union(record) => {
            let is_union = matches!(unqualified.as_ref(), AstType::Union(_));
            let eval_ctx = ctx.eval_ctx();
            let (_, _, members) = constexpr::record_layout(record, is_union, &eval_ctx);
            let mut cursor: usize = 0;
            for entry in entries {
                if let Some(Designator::Member(name)) = entry.designation.first() {
                    if let Some(found) = members.iter().position(|(id, _, _)| id.as_deref() == Some(name.as_str())) {
                        cursor = found;
                    }
                }
                let Some((_, member_offset, member_ty)) = members.get(cursor) else {
                    break;
                };
                let member_ty = Rc::clone(member_ty);
                let member_offset = base_offset + *member_offset as i64;
                lower_initializer_entry(base_slot, member_offset, &member_ty, &entry.value, ctx, out)?;
                cursor += 1;
                if is_union {
                    break;
                }
            }
            Ok(())
        }
        AstType::Array { element, boundary } => {
            let eval_ctx = ctx.eval_ctx();
            let stride = constexpr::size_of(element, &eval_ctx) as i64;
            let bound = match boundary {
                ArrayBoundary::Bounded(n) | ArrayBoundary::BoundedStatic(n) => Some(*n as usize),
                _ => None,
            };
            let mut cursor: usize = 0;
            for entry in entries {
                if let Some(Designator::Index(n)) = entry.designation.first() {
                    cursor = *n as usize;
                }
                if let Some(bound) = bound {
                    if cursor >= bound {
                        break;
                    }
                }
                let offset = base_offset + stride * cursor as i64;
                lower_initializer_entry(base_slot, offset, element, &entry.value, ctx, out)?;
                cursor += 1;
            }
            Ok(())
        }
        _ if entries.len() == 1 && entries[0].designation.is_empty() => {
            lower_initializer_entry(base_slot, base_offset, ty, &entries[0].value, ctx, out)
        }
        _ => Err(TranslateError::invalid_parameter("brace initializer on a type that is not a struct, union, or array")),
    }
}

fn lower_initializer_entry(
    base_slot: u32,
    offset: i64,
    ty: &AstTypeRef,
    value: &Initializer,
    ctx: &mut ExprLowerCtx,
    out: &mut Vec<IrInstruction>,
) -> Result<()> {
    match value {
        Initializer::Expression(expr) => {
            out.push(IrInstruction::new(Opcode::GetLocal, Operand::LocalSlot(base_slot)));
            if offset != 0 {
                emit_offset(offset, ctx, out);
            }
            let rhs_ty = lower_expression(expr, ctx, out)?;
            emit_typeconv(&rhs_ty, ty, ctx, out);
            emit_store(ty, ctx, out);
            Ok(())
        }
        Initializer::List(nested) => lower_aggregate_initializer(base_slot, offset, ty, nested, ctx, out),
    }
}
