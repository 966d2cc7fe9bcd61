// The reference device backend. ElfImageCompiler turns a DeviceImage into a relocatable ELF
// object for the simulator target, where the coprocessor's remote execution model runs
// in-process on the host ISA. Every device function gets two sections: `.text.<fn>`, the
// function entry, and `.text.<fn>_argv`, a thunk the runtime calls with a single pointer to an
// argument vector. The thunk unpacks that vector into a native System V call: buffer slots hold
// buffer descriptor pointers and are passed as pointers, scalar slots hold a pointer to the
// boxed value and are loaded through it into a GP or XMM register, and whatever does not fit
// the register file goes into stack slots. The call to the entry is a PC-relative relocation
// against the entry's symbol. The runtime's own initializer lives in
// `.text.hexagon_init_runtime`. Section and symbol order follow the image, so compilation is
// deterministic.
//
// Entries are stubs that report success; region bodies are validated against their argument
// lists but not lowered to machine code.

use super::image::{Argument, ArgumentKind, DeviceFunction, DeviceImage, Linkage};
use super::{DeviceCompileError, DeviceCompiler, DeviceTarget};
use crate::ir::{Type, TypeCode};
use crate::offload::closure::Closure;
use crate::offload::runtime::{INIT_RUNTIME_FUNCTION, text_section_name};
use crate::x64::{AsmReg, CCAssigner, CCAssignment, RegBank, SysVAssigner, X64Encoder};
use bumpalo::{collections::Vec as BumpVec, Bump};
use hashbrown::{HashMap, HashSet};
use object::write::{Object, Relocation, SectionId, Symbol, SymbolId, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, RelocationEncoding, RelocationFlags, RelocationKind, SectionKind,
    SymbolFlags, SymbolKind, SymbolScope,
};

const FUNCTION_ALIGN: u64 = 16;
const ARGV_SLOT_BYTES: i32 = 8;

/// Where one argv slot ends up in the native call.
#[derive(Debug, Clone, Copy)]
struct SlotPlan {
    slot: usize,
    /// Scalars are boxed; `None` for buffers, which are passed as the slot's pointer.
    scalar: Option<Type>,
    assignment: CCAssignment,
}

/// Calling layout of an argv thunk.
struct ThunkFrame<'a> {
    slots: BumpVec<'a, SlotPlan>,
    stack_size: u32,
}

impl<'a> ThunkFrame<'a> {
    fn plan(arena: &'a Bump, function: &DeviceFunction) -> Result<Self, DeviceCompileError> {
        let mut assigner = SysVAssigner::new();
        let mut slots = BumpVec::with_capacity_in(function.args.len(), arena);

        for (slot, arg) in function.args.iter().enumerate() {
            let (bank, size, scalar) = if arg.is_buffer() {
                (RegBank::GeneralPurpose, 8, None)
            } else {
                let bank = scalar_bank(function, arg)?;
                (bank, arg.ty.bytes() as u32, Some(arg.ty))
            };
            let mut assignment = CCAssignment::new(bank, size);
            assigner.assign_arg(&mut assignment);
            log::trace!(
                "{}: slot {slot} ({}) -> {}",
                function.argv_name(),
                arg.name,
                match (assignment.reg, assignment.stack_off) {
                    (Some(reg), _) => reg.to_string(),
                    (None, Some(off)) => format!("[rsp + {off}]"),
                    (None, None) => "?".to_string(),
                }
            );
            slots.push(SlotPlan { slot, scalar, assignment });
        }

        Ok(Self { slots, stack_size: assigner.stack_size() })
    }
}

fn scalar_bank(function: &DeviceFunction, arg: &Argument) -> Result<RegBank, DeviceCompileError> {
    let unsupported = |what: &str| DeviceCompileError::IllFormed {
        function: function.name.clone(),
        reason: format!("{what} argument {} cannot be passed by the argv thunk", arg.name),
    };
    if arg.ty.lanes != 1 {
        return Err(unsupported("vector"));
    }
    match arg.ty.code {
        TypeCode::Float if arg.ty.bits == 32 || arg.ty.bits == 64 => Ok(RegBank::Xmm),
        TypeCode::Float => Err(unsupported(&arg.ty.to_string())),
        TypeCode::Int | TypeCode::UInt | TypeCode::Handle => Ok(RegBank::GeneralPurpose),
    }
}

/// Relocatable ELF backend for [`DeviceTarget::simulator`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ElfImageCompiler;

impl ElfImageCompiler {
    pub fn new() -> Self {
        Self
    }

    pub fn supports(&self, target: &DeviceTarget) -> bool {
        *target == DeviceTarget::simulator()
    }

    /// Check that every function can be built from the image alone.
    pub fn validate(&self, image: &DeviceImage) -> Result<(), DeviceCompileError> {
        let mut names = HashSet::new();
        let argv_owners: HashMap<String, &str> =
            image.functions.iter().map(|f| (f.argv_name(), f.name.as_str())).collect();
        for function in &image.functions {
            let ill_formed = |reason: String| DeviceCompileError::IllFormed { function: function.name.clone(), reason };

            if function.name.is_empty() {
                return Err(ill_formed("empty function name".into()));
            }
            if function.name == INIT_RUNTIME_FUNCTION {
                return Err(ill_formed("name is reserved for the runtime".into()));
            }
            if !names.insert(function.name.as_str()) {
                return Err(ill_formed("defined more than once".into()));
            }
            if let Some(owner) = argv_owners.get(function.name.as_str()) {
                return Err(ill_formed(format!("function name collides with argv entry of {owner}")));
            }

            let mut arg_names = HashSet::new();
            for arg in &function.args {
                if !arg_names.insert(arg.name.as_str()) {
                    return Err(ill_formed(format!("duplicate argument {}", arg.name)));
                }
            }

            let closure = Closure::extract(&function.body);
            for name in closure.vars.keys() {
                match function.args.iter().find(|a| &a.name == name) {
                    Some(arg) if !arg.is_buffer() => {}
                    _ => return Err(ill_formed(format!("free variable {name} is not a scalar argument"))),
                }
            }
            for (name, buffer) in &closure.buffers {
                let Some(arg) = function.args.iter().find(|a| &a.name == name && a.is_buffer()) else {
                    return Err(ill_formed(format!("buffer {name} is not an argument")));
                };
                if buffer.write && arg.kind != ArgumentKind::OutputBuffer {
                    return Err(ill_formed(format!("buffer {name} is written but not an output")));
                }
            }
        }
        Ok(())
    }

    /// `xor eax, eax; ret`
    fn encode_stub(&self, name: &str) -> Result<Vec<u8>, DeviceCompileError> {
        let wrap = |source| DeviceCompileError::Encoding { function: name.to_string(), source };
        let mut encoder = X64Encoder::new().map_err(wrap)?;
        encoder.zero_reg(AsmReg::RAX).map_err(wrap)?;
        encoder.ret().map_err(wrap)?;
        Ok(encoder.finalize().map_err(wrap)?.bytes)
    }

    /// Encode the argv thunk. Returns the code and the offset of the
    /// displacement of its call to the entry.
    fn encode_thunk(
        &self,
        arena: &Bump,
        function: &DeviceFunction,
    ) -> Result<(Vec<u8>, usize), DeviceCompileError> {
        let frame = ThunkFrame::plan(arena, function)?;
        let wrap = |source| DeviceCompileError::Encoding { function: function.argv_name(), source };
        let mut enc = X64Encoder::new().map_err(wrap)?;

        let mut stacked: BumpVec<'_, &SlotPlan> = BumpVec::new_in(arena);
        stacked.extend(frame.slots.iter().filter(|p| p.assignment.stack_off.is_some()));
        stacked.sort_by_key(|p| p.assignment.stack_off);

        // The call site must be 16-byte aligned; rsp is 8 off on entry.
        let pad = if stacked.len() % 2 == 0 { 8 } else { 0 };
        let argv = AsmReg::RAX;
        let scratch = AsmReg::R10;

        enc.mov_reg_reg(argv, AsmReg::RDI).map_err(wrap)?;
        if pad != 0 {
            enc.sub_reg_imm(AsmReg::RSP, pad).map_err(wrap)?;
        }
        for plan in stacked.iter().rev() {
            let offset = plan.slot as i32 * ARGV_SLOT_BYTES;
            enc.mov_reg_mem(scratch, argv, offset).map_err(wrap)?;
            if let Some(ty) = plan.scalar {
                enc.load_int(scratch, scratch, 0, plan.assignment.size, ty.is_int()).map_err(wrap)?;
            }
            enc.push_reg(scratch).map_err(wrap)?;
        }

        for plan in frame.slots.iter() {
            let Some(reg) = plan.assignment.reg else { continue };
            let offset = plan.slot as i32 * ARGV_SLOT_BYTES;
            match (plan.scalar, reg.bank) {
                (None, _) => enc.mov_reg_mem(reg, argv, offset).map_err(wrap)?,
                (Some(_), RegBank::Xmm) => {
                    enc.mov_reg_mem(scratch, argv, offset).map_err(wrap)?;
                    enc.load_float(reg, scratch, 0, plan.assignment.size).map_err(wrap)?;
                }
                (Some(ty), RegBank::GeneralPurpose) => {
                    enc.mov_reg_mem(reg, argv, offset).map_err(wrap)?;
                    enc.load_int(reg, reg, 0, plan.assignment.size, ty.is_int()).map_err(wrap)?;
                }
            }
        }

        enc.call_external().map_err(wrap)?;
        let cleanup = stacked.len() as i32 * ARGV_SLOT_BYTES + pad;
        if cleanup != 0 {
            enc.add_reg_imm(AsmReg::RSP, cleanup).map_err(wrap)?;
        }
        enc.ret().map_err(wrap)?;

        let code = enc.finalize().map_err(wrap)?;
        let fixup = code.call_fixups.first().copied().unwrap_or_default();
        Ok((code.bytes, fixup))
    }
}

/// Add `.text.<symbol>` holding `code` and a symbol covering it.
fn define_function(
    obj: &mut Object<'_>,
    symbol: &str,
    code: &[u8],
    linkage: Linkage,
) -> (SectionId, SymbolId, u64) {
    let section = obj.add_section(Vec::new(), text_section_name(symbol).into_bytes(), SectionKind::Text);
    let offset = obj.append_section_data(section, code, FUNCTION_ALIGN);
    let scope = match linkage {
        Linkage::External => SymbolScope::Dynamic,
        Linkage::Internal => SymbolScope::Compilation,
    };
    let symbol = obj.add_symbol(Symbol {
        name: symbol.as_bytes().to_vec(),
        value: offset,
        size: code.len() as u64,
        kind: SymbolKind::Text,
        scope,
        weak: false,
        section: SymbolSection::Section(section),
        flags: SymbolFlags::None,
    });
    (section, symbol, offset)
}

impl DeviceCompiler for ElfImageCompiler {
    fn compile(&self, image: &DeviceImage) -> Result<Vec<u8>, DeviceCompileError> {
        if !self.supports(&image.target) {
            return Err(DeviceCompileError::UnsupportedTarget { target: image.target.to_string() });
        }
        self.validate(image)?;

        let arena = Bump::new();
        let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);

        for function in &image.functions {
            let entry = self.encode_stub(&function.name)?;
            let (_, entry_symbol, _) = define_function(&mut obj, &function.name, &entry, function.linkage);

            let (thunk, fixup) = self.encode_thunk(&arena, function)?;
            let (thunk_section, _, thunk_offset) =
                define_function(&mut obj, &function.argv_name(), &thunk, Linkage::External);
            obj.add_relocation(
                thunk_section,
                Relocation {
                    offset: thunk_offset + fixup as u64,
                    symbol: entry_symbol,
                    addend: -4,
                    flags: RelocationFlags::Generic {
                        kind: RelocationKind::Relative,
                        encoding: RelocationEncoding::Generic,
                        size: 32,
                    },
                },
            )?;
            log::trace!("{}: entry {} bytes, thunk {} bytes", function.name, entry.len(), thunk.len());
        }

        let init = self.encode_stub(INIT_RUNTIME_FUNCTION)?;
        define_function(&mut obj, INIT_RUNTIME_FUNCTION, &init, Linkage::External);

        let bytes = obj.write()?;
        log::debug!(
            "Compiled device image {} ({} functions) to {} bytes",
            image.name,
            image.functions.len(),
            bytes.len()
        );
        Ok(bytes)
    }
}
