//! Type translator (`spec.md` §4.4, component C4).
//!
//! `translate_object_type` appends typeentries for an `AstType` into the IR
//! module's flat type list and, when requested, builds the parallel
//! `TypeLayout` tree. Function types are rejected as object types; only
//! §4.3's "incomplete-type substitute" path asks for their size, and it
//! never goes through here.

use std::rc::Rc;

use astir_ast::{ArrayBoundary, AstType, AstTypeRef, Qualifiers};
use astir_ir::error::Result;
use astir_ir::{IrModule, TranslateError, TypeEntry, TypeEntryId, Typecode};

use crate::config::TranslationConfig;
use crate::layout::{BitfieldPlacementProps, StructMember, TypeLayout, TypeLayoutVariant};
use crate::target::{BitFieldAllocator, BitFieldResult, ScalarKind, TargetEnvironment};

pub(crate) fn round_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        value
    } else {
        (value + align - 1) / align * align
    }
}

/// Alignment of a type without emitting any typeentries for it -- used by
/// `ARRAY` headers, which (like `STRUCT`/`UNION` headers) must carry their
/// element's alignment before the element itself is translated.
pub(crate) fn alignment_hint(ty: &AstTypeRef, target: &dyn TargetEnvironment, config: &TranslationConfig) -> u32 {
    match ty.as_ref() {
        AstType::Qualified { ty, .. } => alignment_hint(ty, target, config),
        AstType::BitPrecise { width, .. } => {
            crate::target::bit_precise_layout(*width, target.scalar_layout(ScalarKind::Pointer).1).1
        }
        AstType::Enumeration(enum_ty) => alignment_hint(&enum_ty.underlying, target, config),
        AstType::Array { element, .. } => alignment_hint(element, target, config),
        AstType::Structure(record) | AstType::Union(record) => {
            if record.packed || record.fields.is_empty() {
                1
            } else {
                record
                    .fields
                    .iter()
                    .map(|field| match field.bitfield_width {
                        Some(0) => 1,
                        Some(_) => config.bitfield_storage_unit_bits / 8,
                        None => alignment_hint(&field.ty, target, config),
                    })
                    .max()
                    .unwrap_or(1)
            }
        }
        other => scalar_kind_for(other).map(|kind| target.scalar_layout(kind).1).unwrap_or(1),
    }
}

pub(crate) fn scalar_kind_for(ty: &AstType) -> Option<ScalarKind> {
    Some(match ty {
        AstType::Bool => ScalarKind::Bool,
        AstType::SignedChar => ScalarKind::SignedChar,
        AstType::UnsignedChar => ScalarKind::UnsignedChar,
        AstType::Char => ScalarKind::Char,
        AstType::Short { .. } => ScalarKind::Short,
        AstType::Int { .. } => ScalarKind::Int,
        AstType::Long { .. } => ScalarKind::Long,
        AstType::LongLong { .. } => ScalarKind::LongLong,
        AstType::Float => ScalarKind::Float,
        AstType::Double => ScalarKind::Double,
        AstType::LongDouble => ScalarKind::LongDouble,
        AstType::ComplexFloat => ScalarKind::ComplexFloat,
        AstType::ComplexDouble => ScalarKind::ComplexDouble,
        AstType::ComplexLongDouble => ScalarKind::ComplexLongDouble,
        AstType::Pointer(_) | AstType::NullPointer => ScalarKind::Pointer,
        AstType::VaList => ScalarKind::VaList,
        _ => return None,
    })
}

fn typecode_for_scalar(kind: ScalarKind) -> Typecode {
    match kind {
        ScalarKind::Bool => Typecode::Bool,
        ScalarKind::SignedChar | ScalarKind::UnsignedChar | ScalarKind::Char => Typecode::Char,
        ScalarKind::Short => Typecode::Short,
        ScalarKind::Int => Typecode::Int,
        ScalarKind::Long | ScalarKind::LongLong => Typecode::Long,
        ScalarKind::Float => Typecode::Float32,
        ScalarKind::Double => Typecode::Float64,
        ScalarKind::LongDouble => Typecode::LongDouble,
        ScalarKind::ComplexFloat => Typecode::ComplexFloat32,
        ScalarKind::ComplexDouble => Typecode::ComplexFloat64,
        ScalarKind::ComplexLongDouble => Typecode::ComplexLongDouble,
        ScalarKind::Pointer => Typecode::Word,
        ScalarKind::VaList => Typecode::Struct,
    }
}

/// Translates a type into the module's flat typeentry list, optionally
/// building a `TypeLayout` alongside it. Returns the id of the type's root
/// (first-emitted) entry.
pub fn translate_object_type(
    ty: &AstTypeRef,
    module: &mut IrModule,
    target: &dyn TargetEnvironment,
    config: &TranslationConfig,
    build_layout: bool,
) -> Result<(TypeEntryId, Option<TypeLayout>)> {
    translate_inner(ty, Qualifiers::default(), module, target, config, build_layout)
}

fn translate_inner(
    ty: &AstTypeRef,
    inherited_qualifiers: Qualifiers,
    module: &mut IrModule,
    target: &dyn TargetEnvironment,
    config: &TranslationConfig,
    build_layout: bool,
) -> Result<(TypeEntryId, Option<TypeLayout>)> {
    match ty.as_ref() {
        AstType::Qualified { ty: inner, qualifiers } => {
            let mut combined = inherited_qualifiers;
            combined.const_ |= qualifiers.const_;
            combined.volatile |= qualifiers.volatile;
            combined.restrict |= qualifiers.restrict;
            combined.atomic |= qualifiers.atomic;
            translate_inner(inner, combined, module, target, config, build_layout)
        }
        AstType::BitPrecise { width, .. } => {
            let (size, alignment) = crate::target::bit_precise_layout(*width, target.scalar_layout(ScalarKind::Pointer).1);
            let mut entry = TypeEntry::new(Typecode::Long, alignment, *width as i64);
            entry.atomic = inherited_qualifiers.atomic;
            let id = module.push_type(entry);
            let layout = build_layout.then(|| TypeLayout::scalar(Rc::clone(ty), alignment, size, id));
            Ok((id, layout))
        }
        AstType::Enumeration(enum_ty) => {
            translate_inner(&enum_ty.underlying, inherited_qualifiers, module, target, config, build_layout)
        }
        AstType::Array { element, boundary } => {
            translate_array(ty, element, boundary, inherited_qualifiers, module, target, config, build_layout)
        }
        AstType::Structure(record) => translate_record(ty, record, false, inherited_qualifiers, module, target, config, build_layout),
        AstType::Union(record) => translate_record(ty, record, true, inherited_qualifiers, module, target, config, build_layout),
        AstType::Function(_) => Err(TranslateError::invalid_parameter(
            "function types cannot be translated as object types",
        )),
        AstType::Auto => Err(TranslateError::invalid_state(
            "unresolved auto type reached the translator",
        )),
        other => {
            let kind = scalar_kind_for(other).ok_or_else(|| {
                TranslateError::invalid_parameter("unsupported scalar type in translate_object_type")
            })?;
            let (size, alignment) = target.scalar_layout(kind);
            let mut entry = TypeEntry::new(typecode_for_scalar(kind), alignment, 0);
            entry.atomic = inherited_qualifiers.atomic;
            let id = module.push_type(entry);
            let layout = build_layout.then(|| TypeLayout::scalar(Rc::clone(ty), alignment, size, id));
            Ok((id, layout))
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn translate_array(
    owner: &AstTypeRef,
    element: &AstTypeRef,
    boundary: &ArrayBoundary,
    qualifiers: Qualifiers,
    module: &mut IrModule,
    target: &dyn TargetEnvironment,
    config: &TranslationConfig,
    build_layout: bool,
) -> Result<(TypeEntryId, Option<TypeLayout>)> {
    match boundary {
        ArrayBoundary::Vla(_) | ArrayBoundary::VlaStatic(_) => {
            let (ptr_size, ptr_align) = target.scalar_layout(ScalarKind::Pointer);
            let header = module.push_type(TypeEntry::new(Typecode::Struct, ptr_align, 2));
            let ptr_entry = module.push_type(TypeEntry::new(Typecode::Word, ptr_align, 0));
            let size_entry = module.push_type(TypeEntry::new(Typecode::Long, ptr_align, 0));
            let layout = build_layout.then(|| {
                let ptr_layout = TypeLayout::scalar(Rc::clone(element), ptr_align, ptr_size, ptr_entry);
                let size_layout = TypeLayout::scalar(Rc::clone(element), ptr_align, 8, size_entry);
                TypeLayout {
                    ty: Rc::clone(owner),
                    alignment: ptr_align,
                    size: ptr_size + 8,
                    value: header,
                    variant: TypeLayoutVariant::Structure {
                        members: vec![
                            StructMember {
                                identifier: Some("__vla_ptr".into()),
                                layout: Box::new(ptr_layout),
                                relative_offset: 0,
                                bitfield: false,
                                bitfield_props: None,
                            },
                            StructMember {
                                identifier: Some("__vla_len".into()),
                                layout: Box::new(size_layout),
                                relative_offset: ptr_size,
                                bitfield: false,
                                bitfield_props: None,
                            },
                        ],
                    },
                }
            });
            let layout = layout.map(|mut l| {
                l.variant = TypeLayoutVariant::VlArray {
                    array_ptr_field_index: 0,
                    array_size_field_index: 1,
                };
                l
            });
            Ok((header, layout))
        }
        ArrayBoundary::Unbounded | ArrayBoundary::Bounded(_) | ArrayBoundary::BoundedStatic(_) => {
            let count = match boundary {
                ArrayBoundary::Bounded(n) | ArrayBoundary::BoundedStatic(n) => *n as i64,
                _ => 0,
            };
            let element_align_hint = alignment_hint(element, target, config);
            let header = module.push_type(TypeEntry::new(Typecode::Array, element_align_hint, count).with_atomic(qualifiers.atomic));
            let (_, element_layout) = translate_inner(element, Qualifiers::default(), module, target, config, build_layout)?;
            let element_layout = element_layout.map(Box::new);
            let size = element_layout
                .as_ref()
                .map(|l| l.size * count.max(0) as u64)
                .unwrap_or(0);
            let layout = element_layout.map(|element| TypeLayout {
                ty: Rc::clone(owner),
                alignment: element_align_hint,
                size,
                value: header,
                variant: TypeLayoutVariant::Array { element },
            });
            Ok((header, layout))
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn translate_record(
    owner: &AstTypeRef,
    record: &astir_ast::RecordType,
    is_union: bool,
    qualifiers: Qualifiers,
    module: &mut IrModule,
    target: &dyn TargetEnvironment,
    config: &TranslationConfig,
    build_layout: bool,
) -> Result<(TypeEntryId, Option<TypeLayout>)> {
    let typecode = if is_union { Typecode::Union } else { Typecode::Struct };

    if record.fields.is_empty() {
        let (size, alignment) = if config.empty_structs {
            (1u64, 1u32)
        } else {
            (0u64, 0u32)
        };
        let header = module.push_type(
            TypeEntry::new(typecode, if record.packed { 0 } else { alignment }, 0)
                .with_atomic(qualifiers.atomic),
        );
        if record.packed {
            if let Some(entry) = module.types.get_mut(header.0 as usize) {
                entry.pack();
            }
        }
        if config.empty_structs {
            module.push_type(TypeEntry::new(Typecode::Char, 1, 0));
        }
        let layout = build_layout.then(|| TypeLayout {
            ty: Rc::clone(owner),
            alignment: alignment.max(1),
            size,
            value: header,
            variant: TypeLayoutVariant::Structure { members: Vec::new() },
        });
        return Ok((header, layout));
    }

    let header = module.push_type(TypeEntry::new(typecode, 0, record.fields.len() as i64));

    let mut allocator = BitFieldAllocator::new(config.bitfield_storage_unit_bits);
    let mut current_storage: Option<(TypeEntryId, u64)> = None;
    let mut members = Vec::new();
    let mut cursor: u64 = 0;
    let mut max_align: u32 = 1;
    let storage_unit_bytes = (config.bitfield_storage_unit_bits as u64) / 8;

    for field in &record.fields {
        if let Some(width) = field.bitfield_width {
            if width == 0 {
                allocator.reset();
                current_storage = None;
                continue;
            }
            let colocated = current_storage.is_some();
            let placement = match allocator.next(colocated, width, ()) {
                BitFieldResult::Placed(p) => p,
                BitFieldResult::OutOfSpace => match allocator.next(false, width, ()) {
                    BitFieldResult::Placed(p) => p,
                    BitFieldResult::OutOfSpace => {
                        return Err(TranslateError::invalid_parameter(
                            "bit-field width exceeds storage unit",
                        ))
                    }
                },
            };
            let (storage_id, storage_offset) = if placement.offset_in_storage == 0 {
                if !is_union {
                    cursor = round_up(cursor, storage_unit_bytes);
                }
                let offset = if is_union { 0 } else { cursor };
                let id = module.push_type(TypeEntry::new(Typecode::Int, config.bitfield_storage_unit_bits / 8, 0));
                if !is_union {
                    cursor += storage_unit_bytes;
                }
                max_align = max_align.max(config.bitfield_storage_unit_bits / 8);
                current_storage = Some((id, offset));
                (id, offset)
            } else {
                current_storage.expect("colocated bit-field without an open storage unit")
            };
            let storage_layout = TypeLayout::scalar(Rc::clone(&field.ty), config.bitfield_storage_unit_bits / 8, storage_unit_bytes, storage_id);
            members.push(StructMember {
                identifier: field.identifier.clone(),
                layout: Box::new(storage_layout),
                relative_offset: storage_offset,
                bitfield: true,
                bitfield_props: Some(BitfieldPlacementProps {
                    offset: placement.offset_in_storage,
                    width,
                }),
            });
        } else {
            allocator.reset();
            current_storage = None;
            let (_, field_layout) = translate_inner(&field.ty, Qualifiers::default(), module, target, config, true)?;
            let field_layout = field_layout.expect("layout requested");
            let offset = if is_union {
                0
            } else {
                let aligned = if record.packed { cursor } else { round_up(cursor, field_layout.alignment as u64) };
                aligned
            };
            if !is_union {
                cursor = offset + field_layout.size;
            }
            max_align = max_align.max(field_layout.alignment);
            members.push(StructMember {
                identifier: field.identifier.clone(),
                layout: Box::new(field_layout),
                relative_offset: offset,
                bitfield: false,
                bitfield_props: None,
            });
        }
    }

    let final_alignment = if record.packed { 1 } else { max_align };
    let final_size = if is_union {
        members.iter().map(|m| m.layout.size).max().unwrap_or(0)
    } else {
        round_up(cursor, final_alignment as u64)
    };

    if let Some(entry) = module.types.get_mut(header.0 as usize) {
        entry.alignment = if record.packed { 0 } else { final_alignment };
        entry.atomic = qualifiers.atomic;
        if record.packed {
            entry.pack();
        }
    }

    let layout = build_layout.then(|| TypeLayout {
        ty: Rc::clone(owner),
        alignment: final_alignment,
        size: final_size,
        value: header,
        variant: TypeLayoutVariant::Structure { members },
    });

    Ok((header, layout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use astir_ast::{Field, RecordType};

    fn int_field(name: &str, width: Option<u32>) -> Field {
        Field {
            identifier: Some(name.into()),
            ty: Rc::new(AstType::Int { signed: true }),
            bitfield_width: width,
        }
    }

    #[test]
    fn seed_scenario_one_int_layout() {
        let mut module = IrModule::new();
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let ty = Rc::new(AstType::Int { signed: true });
        let (_id, layout) = translate_object_type(&ty, &mut module, &target, &config, true).unwrap();
        assert_eq!(layout.unwrap().size, 4);
    }

    #[test]
    fn seed_scenario_two_bitfield_struct_layout() {
        let mut module = IrModule::new();
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let fields = vec![
            int_field("a", Some(25)),
            int_field("b", Some(21)),
            Field {
                identifier: Some("c".into()),
                ty: Rc::new(AstType::Short { signed: true }),
                bitfield_width: Some(15),
            },
            Field {
                identifier: Some("d".into()),
                ty: Rc::new(AstType::Char),
                bitfield_width: Some(7),
            },
            int_field("e", None),
        ];
        let record = RecordType {
            complete: true,
            identifier: Some("S".into()),
            fields,
            packed: false,
        };
        let ty = Rc::new(AstType::Structure(record));
        let before = module.types.len();
        let (_id, layout) = translate_object_type(&ty, &mut module, &target, &config, true).unwrap();
        let entries_emitted = module.types.len() - before;
        assert_eq!(entries_emitted, 5);
        let layout = layout.unwrap();
        match layout.variant {
            TypeLayoutVariant::Structure { members } => {
                assert_eq!(members.len(), 5);
                assert_eq!(members[3].bitfield_props.unwrap().width, 7);
            }
            _ => panic!("expected structure layout"),
        }
    }

    #[test]
    fn empty_struct_without_filler_has_zero_size() {
        let mut module = IrModule::new();
        let target = crate::target::DefaultTargetEnvironment;
        let mut config = TranslationConfig::default();
        config.empty_structs = false;
        let ty = Rc::new(AstType::Structure(RecordType {
            complete: true,
            identifier: None,
            fields: vec![],
            packed: false,
        }));
        let (_, layout) = translate_object_type(&ty, &mut module, &target, &config, true).unwrap();
        assert_eq!(layout.unwrap().size, 0);
    }

    #[test]
    fn empty_struct_with_filler_has_size_one() {
        let mut module = IrModule::new();
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let ty = Rc::new(AstType::Structure(RecordType {
            complete: true,
            identifier: None,
            fields: vec![],
            packed: false,
        }));
        let (_, layout) = translate_object_type(&ty, &mut module, &target, &config, true).unwrap();
        assert_eq!(layout.unwrap().size, 1);
    }

    #[test]
    fn function_type_is_rejected_as_object_type() {
        let mut module = IrModule::new();
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let ty = Rc::new(AstType::Function(astir_ast::FunctionType {
            return_type: Rc::new(AstType::Void),
            mode: astir_ast::FunctionMode::ParamEmpty,
            parameters: vec![],
            ellipsis: false,
        }));
        assert!(translate_object_type(&ty, &mut module, &target, &config, false).is_err());
    }

    #[test]
    fn unbounded_array_is_flexible_array_member_shape() {
        let mut module = IrModule::new();
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let ty = Rc::new(AstType::Array {
            element: Rc::new(AstType::Int { signed: true }),
            boundary: ArrayBoundary::Unbounded,
        });
        let (id, layout) = translate_object_type(&ty, &mut module, &target, &config, true).unwrap();
        assert_eq!(module.types[id.0 as usize].param, 0);
        assert_eq!(layout.unwrap().size, 0);
    }
}
