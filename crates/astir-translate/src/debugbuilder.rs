//! Debug-entries builder (`spec.md` §4.5, component C5).
//!
//! Hash-consing needs `AstType` pointer identity, which `astir-ir::debug`
//! deliberately does not depend on (`debug.rs`'s arena only stores the
//! resulting tree) -- so the `type_index` map lives here, keyed by
//! `Rc::as_ptr`. `Qualified` wrappers are never cache keys themselves: only
//! the unqualified `AstType` they wrap is. Every self-referential shape
//! (struct/union/enum/pointer/array/function) is registered in the cache
//! before its children are built, so a type that points back at itself
//! through a pointer member resolves to the same id instead of recursing
//! forever.

use std::rc::Rc;

use astir_ast::{ArrayBoundary, AstType, AstTypeRef, EnumType, FunctionType, RecordType};
use astir_ir::debug::{DebugAttribute, DebugEntryId, DebugEntryKind, DebugInfo};
use astir_ir::error::Result;

use crate::config::TranslationConfig;
use crate::constexpr::{size_of, EvalContext};
use crate::target::{ScalarKind, TargetEnvironment};
use crate::typetranslate::alignment_hint;

/// Per-translation-unit hash-cons table. Lives as long as the `IrModule`
/// being built; `astir-translate`'s function-definition driver (C10) owns
/// one instance for the whole translation unit.
#[derive(Default)]
pub struct DebugEntryBuilder {
    cache: std::collections::HashMap<usize, DebugEntryId>,
}

fn key_of(ty: &AstTypeRef) -> usize {
    Rc::as_ptr(ty) as usize
}

impl DebugEntryBuilder {
    pub fn new() -> Self {
        DebugEntryBuilder::default()
    }

    /// Builds (or returns the cached id for) the debug entry for `ty`.
    pub fn build_type(
        &mut self,
        ty: &AstTypeRef,
        info: &mut DebugInfo,
        target: &dyn TargetEnvironment,
        config: &TranslationConfig,
    ) -> Result<DebugEntryId> {
        if let AstType::Qualified { ty: inner, qualifiers } = ty.as_ref() {
            let inner_id = self.build_type(inner, info, target, config)?;
            let mut id = inner_id;
            if qualifiers.const_ {
                id = wrap_qualifier(info, DebugEntryKind::TypeConst, id);
            }
            if qualifiers.volatile {
                id = wrap_qualifier(info, DebugEntryKind::TypeVolatile, id);
            }
            if qualifiers.restrict {
                id = wrap_qualifier(info, DebugEntryKind::TypeRestrict, id);
            }
            if qualifiers.atomic {
                id = wrap_qualifier(info, DebugEntryKind::TypeAtomic, id);
            }
            return Ok(id);
        }

        let key = key_of(ty);
        if let Some(id) = self.cache.get(&key) {
            return Ok(*id);
        }

        let ctx = EvalContext { target, config };
        match ty.as_ref() {
            AstType::Void => Ok(self.cache_new(key, info, DebugEntryKind::TypeVoid, &[])),
            AstType::Bool => {
                let (size, align) = target.scalar_layout(ScalarKind::Bool);
                Ok(self.cache_new(key, info, DebugEntryKind::TypeBoolean, &size_align(size, align)))
            }
            AstType::SignedChar => {
                let (size, align) = target.scalar_layout(ScalarKind::SignedChar);
                Ok(self.cache_new(key, info, DebugEntryKind::TypeSignedCharacter, &size_align(size, align)))
            }
            AstType::UnsignedChar => {
                let (size, align) = target.scalar_layout(ScalarKind::UnsignedChar);
                Ok(self.cache_new(key, info, DebugEntryKind::TypeUnsignedCharacter, &size_align(size, align)))
            }
            AstType::Char => {
                let (size, align) = target.scalar_layout(ScalarKind::Char);
                let kind = if config.char_is_signed {
                    DebugEntryKind::TypeSignedCharacter
                } else {
                    DebugEntryKind::TypeUnsignedCharacter
                };
                Ok(self.cache_new(key, info, kind, &size_align(size, align)))
            }
            AstType::Short { signed } => self.cache_int(key, info, target.scalar_layout(ScalarKind::Short), *signed),
            AstType::Int { signed } => self.cache_int(key, info, target.scalar_layout(ScalarKind::Int), *signed),
            AstType::Long { signed } => self.cache_int(key, info, target.scalar_layout(ScalarKind::Long), *signed),
            AstType::LongLong { signed } => self.cache_int(key, info, target.scalar_layout(ScalarKind::LongLong), *signed),
            AstType::BitPrecise { signed, width } => {
                let (size, _) = crate::target::bit_precise_layout(*width, target.scalar_layout(ScalarKind::Pointer).1);
                let kind = if *signed {
                    DebugEntryKind::TypeSignedBitPrecise
                } else {
                    DebugEntryKind::TypeUnsignedBitPrecise
                };
                let attrs = vec![DebugAttribute::Size(size), DebugAttribute::Bitwidth(*width)];
                Ok(self.cache_new(key, info, kind, &attrs))
            }
            AstType::Float => {
                let (size, align) = target.scalar_layout(ScalarKind::Float);
                Ok(self.cache_new(key, info, DebugEntryKind::TypeFloat, &size_align(size, align)))
            }
            AstType::Double => {
                let (size, align) = target.scalar_layout(ScalarKind::Double);
                Ok(self.cache_new(key, info, DebugEntryKind::TypeFloat, &size_align(size, align)))
            }
            AstType::LongDouble => {
                let (size, align) = target.scalar_layout(ScalarKind::LongDouble);
                Ok(self.cache_new(key, info, DebugEntryKind::TypeFloat, &size_align(size, align)))
            }
            AstType::ComplexFloat => {
                let (size, align) = target.scalar_layout(ScalarKind::ComplexFloat);
                Ok(self.cache_new(key, info, DebugEntryKind::TypeComplexFloat, &size_align(size, align)))
            }
            AstType::ComplexDouble => {
                let (size, align) = target.scalar_layout(ScalarKind::ComplexDouble);
                Ok(self.cache_new(key, info, DebugEntryKind::TypeComplexFloat, &size_align(size, align)))
            }
            AstType::ComplexLongDouble => {
                let (size, align) = target.scalar_layout(ScalarKind::ComplexLongDouble);
                Ok(self.cache_new(key, info, DebugEntryKind::TypeComplexFloat, &size_align(size, align)))
            }
            AstType::Pointer(inner) => {
                let id = info.push(DebugEntryKind::TypePointer);
                self.cache.insert(key, id);
                let inner_id = self.build_type(inner, info, target, config)?;
                let (size, align) = target.scalar_layout(ScalarKind::Pointer);
                let entry = info.get_mut(id).expect("just pushed");
                entry.push_attribute(DebugAttribute::TypeRef(inner_id));
                entry.push_attribute(DebugAttribute::Size(size));
                entry.push_attribute(DebugAttribute::Alignment(align));
                Ok(id)
            }
            AstType::NullPointer => {
                let (size, align) = target.scalar_layout(ScalarKind::Pointer);
                Ok(self.cache_new(key, info, DebugEntryKind::TypePointer, &size_align(size, align)))
            }
            AstType::Array { element, boundary } => self.build_array(key, ty, element, boundary, info, &ctx),
            AstType::Structure(record) => self.build_record(key, record, false, info, &ctx),
            AstType::Union(record) => self.build_record(key, record, true, info, &ctx),
            AstType::Enumeration(enum_ty) => self.build_enumeration(key, enum_ty, info, target, config),
            AstType::Function(function_ty) => self.build_function(key, function_ty, info, target, config),
            AstType::Qualified { .. } => unreachable!("handled above"),
            AstType::VaList => {
                let (size, align) = target.scalar_layout(ScalarKind::VaList);
                Ok(self.cache_new(key, info, DebugEntryKind::TypeStructure, &size_align(size, align)))
            }
            AstType::Auto => Err(astir_ir::TranslateError::invalid_state(
                "unresolved auto type reached the debug-entries builder",
            )),
        }
    }

    fn cache_new(&mut self, key: usize, info: &mut DebugInfo, kind: DebugEntryKind, attrs: &[DebugAttribute]) -> DebugEntryId {
        let id = info.push(kind);
        self.cache.insert(key, id);
        let entry = info.get_mut(id).expect("just pushed");
        for attr in attrs {
            entry.push_attribute(attr.clone());
        }
        id
    }

    fn cache_int(&mut self, key: usize, info: &mut DebugInfo, (size, align): (u64, u32), signed: bool) -> Result<DebugEntryId> {
        let kind = if signed { DebugEntryKind::TypeSignedInt } else { DebugEntryKind::TypeUnsignedInt };
        Ok(self.cache_new(key, info, kind, &size_align(size, align)))
    }

    fn build_array(
        &mut self,
        key: usize,
        owner: &AstTypeRef,
        element: &AstTypeRef,
        boundary: &ArrayBoundary,
        info: &mut DebugInfo,
        ctx: &EvalContext,
    ) -> Result<DebugEntryId> {
        let id = info.push(DebugEntryKind::TypeArray);
        self.cache.insert(key, id);
        let element_id = self.build_type(element, info, ctx.target, ctx.config)?;

        let subrange = info.push(DebugEntryKind::ArraySubrange);
        if let ArrayBoundary::Bounded(n) | ArrayBoundary::BoundedStatic(n) = boundary {
            info.get_mut(subrange).expect("just pushed").push_attribute(DebugAttribute::Length(*n));
        }

        let align = alignment_hint(owner, ctx.target, ctx.config);
        let size = size_of(owner, ctx);
        let entry = info.get_mut(id).expect("just pushed");
        entry.push_attribute(DebugAttribute::TypeRef(element_id));
        entry.push_attribute(DebugAttribute::Size(size));
        entry.push_attribute(DebugAttribute::Alignment(align));
        entry.push_child(subrange);
        Ok(id)
    }

    fn build_record(&mut self, key: usize, record: &RecordType, is_union: bool, info: &mut DebugInfo, ctx: &EvalContext) -> Result<DebugEntryId> {
        let kind = if is_union { DebugEntryKind::TypeUnion } else { DebugEntryKind::TypeStructure };
        let id = info.push(kind);
        self.cache.insert(key, id);

        let members = record_debug_layout(record, is_union, ctx);
        let mut child_ids = Vec::with_capacity(members.len());
        for member in &members {
            let member_type_id = self.build_type(&member.ty, info, ctx.target, ctx.config)?;
            let child = info.push(DebugEntryKind::StructureMember);
            {
                let entry = info.get_mut(child).expect("just pushed");
                if let Some(name) = &member.identifier {
                    entry.push_attribute(DebugAttribute::Name(name.clone()));
                }
                entry.push_attribute(DebugAttribute::TypeRef(member_type_id));
                entry.push_attribute(DebugAttribute::Offset(member.byte_offset));
                if let Some((bit_offset, width)) = member.bitfield {
                    entry.push_attribute(DebugAttribute::Bitoffset(bit_offset));
                    entry.push_attribute(DebugAttribute::Bitwidth(width));
                }
            }
            child_ids.push(child);
        }

        let align = alignment_hint(&Rc::new(if is_union { AstType::Union(record.clone()) } else { AstType::Structure(record.clone()) }), ctx.target, ctx.config);
        let size = members_total_size(record, is_union, ctx);
        let entry = info.get_mut(id).expect("just pushed");
        if let Some(name) = &record.identifier {
            entry.push_attribute(DebugAttribute::Name(name.clone()));
        }
        entry.push_attribute(DebugAttribute::Size(size));
        entry.push_attribute(DebugAttribute::Alignment(align));
        for child in child_ids {
            entry.push_child(child);
        }
        Ok(id)
    }

    fn build_enumeration(&mut self, key: usize, enum_ty: &EnumType, info: &mut DebugInfo, target: &dyn TargetEnvironment, config: &TranslationConfig) -> Result<DebugEntryId> {
        let id = info.push(DebugEntryKind::TypeEnumeration);
        self.cache.insert(key, id);
        let underlying_id = self.build_type(&enum_ty.underlying, info, target, config)?;

        let mut next_value: i64 = 0;
        let mut child_ids = Vec::with_capacity(enum_ty.enumerators.len());
        for (name, explicit) in &enum_ty.enumerators {
            let value = explicit.unwrap_or(next_value);
            next_value = value + 1;
            let child = info.push(DebugEntryKind::Enumerator);
            let entry = info.get_mut(child).expect("just pushed");
            entry.push_attribute(DebugAttribute::Name(name.clone()));
            entry.push_attribute(DebugAttribute::ConstantUint(value as u64));
            child_ids.push(child);
        }

        let ctx = EvalContext { target, config };
        let size = size_of(&enum_ty.underlying, &ctx);
        let entry = info.get_mut(id).expect("just pushed");
        if let Some(name) = &enum_ty.identifier {
            entry.push_attribute(DebugAttribute::Name(name.clone()));
        }
        entry.push_attribute(DebugAttribute::TypeRef(underlying_id));
        entry.push_attribute(DebugAttribute::Size(size));
        for child in child_ids {
            entry.push_child(child);
        }
        Ok(id)
    }

    fn build_function(&mut self, key: usize, function_ty: &FunctionType, info: &mut DebugInfo, target: &dyn TargetEnvironment, config: &TranslationConfig) -> Result<DebugEntryId> {
        let id = info.push(DebugEntryKind::TypeFunction);
        self.cache.insert(key, id);
        let return_id = self.build_type(&function_ty.return_type, info, target, config)?;

        let mut child_ids = Vec::with_capacity(function_ty.parameters.len() + 1);
        for (name, ty) in &function_ty.parameters {
            let child = info.push(DebugEntryKind::FunctionParameter);
            {
                let entry = info.get_mut(child).expect("just pushed");
                if let Some(name) = name {
                    entry.push_attribute(DebugAttribute::Name(name.clone()));
                }
            }
            if let Some(ty) = ty {
                let param_type_id = self.build_type(ty, info, target, config)?;
                info.get_mut(child).expect("just pushed").push_attribute(DebugAttribute::TypeRef(param_type_id));
            }
            child_ids.push(child);
        }
        if function_ty.ellipsis {
            child_ids.push(info.push(DebugEntryKind::FunctionVararg));
        }

        let entry = info.get_mut(id).expect("just pushed");
        entry.push_attribute(DebugAttribute::TypeRef(return_id));
        for child in child_ids {
            entry.push_child(child);
        }
        Ok(id)
    }
}

fn wrap_qualifier(info: &mut DebugInfo, kind: DebugEntryKind, inner: DebugEntryId) -> DebugEntryId {
    let id = info.push(kind);
    info.get_mut(id).expect("just pushed").push_attribute(DebugAttribute::TypeRef(inner));
    id
}

fn size_align(size: u64, align: u32) -> Vec<DebugAttribute> {
    vec![DebugAttribute::Size(size), DebugAttribute::Alignment(align)]
}

struct DebugMember {
    identifier: Option<String>,
    ty: AstTypeRef,
    byte_offset: u64,
    /// `(bit_offset_in_storage_unit, width)` for bit-fields.
    bitfield: Option<(u32, u32)>,
}

/// Same cursor math as `typetranslate::translate_record`, kept separate
/// because debug members additionally need the bit-field's
/// offset-in-storage-unit, which the plain byte-offset layout in
/// `constexpr::record_layout` does not track.
fn record_debug_layout(record: &RecordType, is_union: bool, ctx: &EvalContext) -> Vec<DebugMember> {
    use crate::target::{BitFieldAllocator, BitFieldResult};
    use crate::typetranslate::round_up;

    let mut members = Vec::new();
    if record.fields.is_empty() {
        return members;
    }

    let mut allocator = BitFieldAllocator::new(ctx.config.bitfield_storage_unit_bits);
    let mut current_storage_offset: Option<u64> = None;
    let mut cursor: u64 = 0;
    let storage_unit_bytes = (ctx.config.bitfield_storage_unit_bits as u64) / 8;

    for field in &record.fields {
        if let Some(width) = field.bitfield_width {
            if width == 0 {
                allocator.reset();
                current_storage_offset = None;
                continue;
            }
            let colocated = current_storage_offset.is_some();
            let placement = match allocator.next(colocated, width, ()) {
                BitFieldResult::Placed(p) => p,
                BitFieldResult::OutOfSpace => match allocator.next(false, width, ()) {
                    BitFieldResult::Placed(p) => p,
                    BitFieldResult::OutOfSpace => continue,
                },
            };
            let offset = if placement.offset_in_storage == 0 {
                if !is_union {
                    cursor = round_up(cursor, storage_unit_bytes);
                }
                let offset = if is_union { 0 } else { cursor };
                if !is_union {
                    cursor += storage_unit_bytes;
                }
                current_storage_offset = Some(offset);
                offset
            } else {
                current_storage_offset.unwrap_or(0)
            };
            members.push(DebugMember {
                identifier: field.identifier.clone(),
                ty: Rc::clone(&field.ty),
                byte_offset: offset,
                bitfield: Some((placement.offset_in_storage, width)),
            });
        } else {
            allocator.reset();
            current_storage_offset = None;
            let align = alignment_hint(&field.ty, ctx.target, ctx.config);
            let size = size_of(&field.ty, ctx);
            let offset = if is_union {
                0
            } else if record.packed {
                cursor
            } else {
                round_up(cursor, align as u64)
            };
            if !is_union {
                cursor = offset + size;
            }
            members.push(DebugMember {
                identifier: field.identifier.clone(),
                ty: Rc::clone(&field.ty),
                byte_offset: offset,
                bitfield: None,
            });
        }
    }
    members
}

fn members_total_size(record: &RecordType, is_union: bool, ctx: &EvalContext) -> u64 {
    if record.fields.is_empty() {
        return if ctx.config.empty_structs { 1 } else { 0 };
    }
    if is_union {
        record.fields.iter().map(|f| size_of(&f.ty, ctx)).max().unwrap_or(0)
    } else {
        let owner = Rc::new(AstType::Structure(record.clone()));
        size_of(&owner, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astir_ast::{Field, Qualifiers};

    fn ctx(target: &dyn TargetEnvironment, config: &TranslationConfig) -> EvalContext<'_> {
        EvalContext { target, config }
    }

    #[test]
    fn same_type_is_hash_consed_to_one_entry() {
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let mut info = DebugInfo::default();
        let mut builder = DebugEntryBuilder::new();
        let ty: AstTypeRef = Rc::new(AstType::Int { signed: true });
        let a = builder.build_type(&ty, &mut info, &target, &config).unwrap();
        let b = builder.build_type(&ty, &mut info, &target, &config).unwrap();
        assert_eq!(a, b);
        assert_eq!(info.len(), 1);
    }

    #[test]
    fn qualified_wrapper_is_not_cached_but_inner_is() {
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let mut info = DebugInfo::default();
        let mut builder = DebugEntryBuilder::new();
        let inner: AstTypeRef = Rc::new(AstType::Int { signed: true });
        let qualified_a = Rc::new(AstType::Qualified {
            ty: Rc::clone(&inner),
            qualifiers: Qualifiers { const_: true, ..Default::default() },
        });
        let qualified_b = Rc::new(AstType::Qualified {
            ty: Rc::clone(&inner),
            qualifiers: Qualifiers { const_: true, ..Default::default() },
        });
        let a = builder.build_type(&qualified_a, &mut info, &target, &config).unwrap();
        let b = builder.build_type(&qualified_b, &mut info, &target, &config).unwrap();
        // Two distinct wrapper entries, but both referencing the same inner.
        assert_ne!(a, b);
        assert_eq!(info.len(), 3);
        assert_eq!(info.get(a).unwrap().kind, DebugEntryKind::TypeConst);
    }

    #[test]
    fn two_pointers_to_the_same_struct_share_the_pointee_entry() {
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let mut info = DebugInfo::default();
        let mut builder = DebugEntryBuilder::new();

        let record: AstTypeRef = Rc::new(AstType::Structure(RecordType {
            complete: true,
            identifier: Some("node".into()),
            fields: vec![Field { identifier: Some("value".into()), ty: Rc::new(AstType::Int { signed: true }), bitfield_width: None }],
            packed: false,
        }));
        let ptr_a: AstTypeRef = Rc::new(AstType::Pointer(Rc::clone(&record)));
        let ptr_b: AstTypeRef = Rc::new(AstType::Pointer(Rc::clone(&record)));

        let id_a = builder.build_type(&ptr_a, &mut info, &target, &config).unwrap();
        let id_b = builder.build_type(&ptr_b, &mut info, &target, &config).unwrap();
        assert_ne!(id_a, id_b, "the two pointer types themselves are distinct entries");

        let pointee_a = info.get(id_a).unwrap().attributes.iter().find_map(|a| match a {
            DebugAttribute::TypeRef(id) => Some(*id),
            _ => None,
        });
        let pointee_b = info.get(id_b).unwrap().attributes.iter().find_map(|a| match a {
            DebugAttribute::TypeRef(id) => Some(*id),
            _ => None,
        });
        assert_eq!(pointee_a, pointee_b, "both pointers share one hash-consed entry for `node`");
    }

    #[test]
    fn enumerator_values_follow_implicit_increment_rule() {
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let mut info = DebugInfo::default();
        let mut builder = DebugEntryBuilder::new();
        let enum_ty = EnumType {
            complete: true,
            identifier: Some("Color".into()),
            underlying: Rc::new(AstType::Int { signed: true }),
            enumerators: vec![("RED".into(), Some(5)), ("GREEN".into(), None), ("BLUE".into(), Some(10))],
        };
        let ty: AstTypeRef = Rc::new(AstType::Enumeration(enum_ty));
        let id = builder.build_type(&ty, &mut info, &target, &config).unwrap();
        let entry = info.get(id).unwrap();
        assert_eq!(entry.children.len(), 3);
        let green = info.get(entry.children[1]).unwrap();
        assert!(green.attributes.contains(&DebugAttribute::ConstantUint(6)));
    }

    #[test]
    fn bitfield_struct_member_carries_bit_offset_and_width() {
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let mut info = DebugInfo::default();
        let mut builder = DebugEntryBuilder::new();
        let record = RecordType {
            complete: true,
            identifier: Some("flags".into()),
            fields: vec![
                Field { identifier: Some("a".into()), ty: Rc::new(AstType::Int { signed: true }), bitfield_width: Some(3) },
                Field { identifier: Some("b".into()), ty: Rc::new(AstType::Int { signed: true }), bitfield_width: Some(5) },
            ],
            packed: false,
        };
        let ty: AstTypeRef = Rc::new(AstType::Structure(record));
        let id = builder.build_type(&ty, &mut info, &target, &config).unwrap();
        let entry = info.get(id).unwrap();
        let b = info.get(entry.children[1]).unwrap();
        assert!(b.attributes.contains(&DebugAttribute::Bitoffset(3)));
        assert!(b.attributes.contains(&DebugAttribute::Bitwidth(5)));
    }

    #[test]
    fn ctx_helper_is_used_by_array_builder() {
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let c = ctx(&target, &config);
        let ty: AstTypeRef = Rc::new(AstType::Array {
            element: Rc::new(AstType::Int { signed: true }),
            boundary: ArrayBoundary::Bounded(4),
        });
        let mut info = DebugInfo::default();
        let mut builder = DebugEntryBuilder::new();
        let id = builder.build_type(&ty, &mut info, c.target, c.config).unwrap();
        let entry = info.get(id).unwrap();
        assert!(entry.attributes.iter().any(|a| matches!(a, DebugAttribute::Size(16))));
    }
}
