// This module wraps the iced-x86 code assembler for the small amount of x86-64 the simulator
// device backend emits: function stubs and argv thunks. X64Encoder converts AsmReg references
// into iced registers and exposes one method per instruction form the thunks need: register
// moves, sized loads with zero or sign extension, SSE scalar loads, stack adjustment, push and
// ret. Calls to other functions in the device object cannot be resolved by the assembler, so
// call_external() emits a CALL rel32 with a zero displacement and records its position; the
// object writer later turns each recorded fixup into a PC-relative relocation. Code is
// position independent and assembled starting at offset zero of its section.

//! x86-64 instruction encoding using iced-x86.

use super::calling_convention::{AsmReg, RegBank};
use iced_x86::code_asm::*;
use thiserror::Error;

/// Error types for instruction encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// Invalid register for the requested operation.
    #[error("Invalid register {0} for operation")]
    InvalidRegister(AsmReg),

    /// Unsupported instruction or operand combination.
    #[error("Unsupported operand size of {0} bytes")]
    UnsupportedOperandSize(u32),

    /// Assembly error from iced-x86.
    #[error("Assembly error: {0}")]
    AssemblyError(String),
}

/// Machine code produced by [`X64Encoder::finalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedCode {
    pub bytes: Vec<u8>,
    /// Offsets of the rel32 displacement of each external call, in emission order.
    pub call_fixups: Vec<usize>,
}

const CALL_REL32: u8 = 0xE8;

/// x86-64 instruction encoder using iced-x86.
pub struct X64Encoder {
    /// Instructions since the last external call.
    assembler: CodeAssembler,
    /// Code assembled so far.
    code: EncodedCode,
}

impl X64Encoder {
    pub fn new() -> Result<Self, EncodingError> {
        Ok(Self {
            assembler: Self::new_assembler()?,
            code: EncodedCode::default(),
        })
    }

    fn new_assembler() -> Result<CodeAssembler, EncodingError> {
        CodeAssembler::new(64).map_err(|e| EncodingError::AssemblyError(e.to_string()))
    }

    /// Convert AsmReg to iced-x86 64-bit GP register.
    fn gp64(reg: AsmReg) -> Result<AsmRegister64, EncodingError> {
        const GP64_REGS: [AsmRegister64; 16] = [
            rax, rcx, rdx, rbx, rsp, rbp, rsi, rdi,
            r8, r9, r10, r11, r12, r13, r14, r15,
        ];

        if reg.bank != RegBank::GeneralPurpose {
            return Err(EncodingError::InvalidRegister(reg));
        }
        GP64_REGS.get(reg.id as usize).copied().ok_or(EncodingError::InvalidRegister(reg))
    }

    /// Convert AsmReg to iced-x86 32-bit GP register.
    fn gp32(reg: AsmReg) -> Result<AsmRegister32, EncodingError> {
        const GP32_REGS: [AsmRegister32; 16] = [
            eax, ecx, edx, ebx, esp, ebp, esi, edi,
            r8d, r9d, r10d, r11d, r12d, r13d, r14d, r15d,
        ];

        if reg.bank != RegBank::GeneralPurpose {
            return Err(EncodingError::InvalidRegister(reg));
        }
        GP32_REGS.get(reg.id as usize).copied().ok_or(EncodingError::InvalidRegister(reg))
    }

    fn xmm(reg: AsmReg) -> Result<AsmRegisterXmm, EncodingError> {
        const XMM_REGS: [AsmRegisterXmm; 16] = [
            xmm0, xmm1, xmm2, xmm3, xmm4, xmm5, xmm6, xmm7,
            xmm8, xmm9, xmm10, xmm11, xmm12, xmm13, xmm14, xmm15,
        ];

        if reg.bank != RegBank::Xmm {
            return Err(EncodingError::InvalidRegister(reg));
        }
        XMM_REGS.get(reg.id as usize).copied().ok_or(EncodingError::InvalidRegister(reg))
    }

    fn asm_err(e: iced_x86::IcedError) -> EncodingError {
        EncodingError::AssemblyError(e.to_string())
    }

    /// Emit MOV instruction - register to register.
    pub fn mov_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> Result<(), EncodingError> {
        let dst_reg = Self::gp64(dst)?;
        let src_reg = Self::gp64(src)?;
        self.assembler.mov(dst_reg, src_reg).map_err(Self::asm_err)
    }

    /// Emit MOV instruction - 64-bit memory to register.
    pub fn mov_reg_mem(&mut self, dst: AsmReg, base: AsmReg, offset: i32) -> Result<(), EncodingError> {
        self.load_int(dst, base, offset, 8, false)
    }

    /// Load an integer of `size` bytes into a GP register. Values narrower
    /// than 32 bits are zero- or sign-extended to 32 bits.
    pub fn load_int(
        &mut self,
        dst: AsmReg,
        base: AsmReg,
        offset: i32,
        size: u32,
        signed: bool,
    ) -> Result<(), EncodingError> {
        let base_reg = Self::gp64(base)?;
        let result = match (size, signed) {
            (1, false) => self.assembler.movzx(Self::gp32(dst)?, byte_ptr(base_reg + offset)),
            (1, true) => self.assembler.movsx(Self::gp32(dst)?, byte_ptr(base_reg + offset)),
            (2, false) => self.assembler.movzx(Self::gp32(dst)?, word_ptr(base_reg + offset)),
            (2, true) => self.assembler.movsx(Self::gp32(dst)?, word_ptr(base_reg + offset)),
            (4, _) => self.assembler.mov(Self::gp32(dst)?, dword_ptr(base_reg + offset)),
            (8, _) => self.assembler.mov(Self::gp64(dst)?, qword_ptr(base_reg + offset)),
            _ => return Err(EncodingError::UnsupportedOperandSize(size)),
        };
        result.map_err(Self::asm_err)
    }

    /// Load a scalar float of `size` bytes into an XMM register.
    pub fn load_float(&mut self, dst: AsmReg, base: AsmReg, offset: i32, size: u32) -> Result<(), EncodingError> {
        let dst_reg = Self::xmm(dst)?;
        let base_reg = Self::gp64(base)?;
        let result = match size {
            4 => self.assembler.movss(dst_reg, dword_ptr(base_reg + offset)),
            8 => self.assembler.movsd_2(dst_reg, qword_ptr(base_reg + offset)),
            _ => return Err(EncodingError::UnsupportedOperandSize(size)),
        };
        result.map_err(Self::asm_err)
    }

    /// Emit XOR of the 32-bit view of a register with itself.
    pub fn zero_reg(&mut self, reg: AsmReg) -> Result<(), EncodingError> {
        let reg32 = Self::gp32(reg)?;
        self.assembler.xor(reg32, reg32).map_err(Self::asm_err)
    }

    pub fn add_reg_imm(&mut self, dst: AsmReg, imm: i32) -> Result<(), EncodingError> {
        let dst_reg = Self::gp64(dst)?;
        self.assembler.add(dst_reg, imm).map_err(Self::asm_err)
    }

    pub fn sub_reg_imm(&mut self, dst: AsmReg, imm: i32) -> Result<(), EncodingError> {
        let dst_reg = Self::gp64(dst)?;
        self.assembler.sub(dst_reg, imm).map_err(Self::asm_err)
    }

    pub fn push_reg(&mut self, reg: AsmReg) -> Result<(), EncodingError> {
        let reg = Self::gp64(reg)?;
        self.assembler.push(reg).map_err(Self::asm_err)
    }

    pub fn ret(&mut self) -> Result<(), EncodingError> {
        self.assembler.ret().map_err(Self::asm_err)
    }

    /// Emit a CALL to a symbol outside this code block. The displacement is
    /// left zero and its offset is recorded in [`EncodedCode::call_fixups`].
    pub fn call_external(&mut self) -> Result<(), EncodingError> {
        self.flush()?;
        self.code.bytes.push(CALL_REL32);
        self.code.call_fixups.push(self.code.bytes.len());
        self.code.bytes.extend_from_slice(&0i32.to_le_bytes());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EncodingError> {
        if self.assembler.instructions().is_empty() {
            return Ok(());
        }
        let mut assembler = std::mem::replace(&mut self.assembler, Self::new_assembler()?);
        let ip = self.code.bytes.len() as u64;
        let bytes = assembler.assemble(ip).map_err(Self::asm_err)?;
        self.code.bytes.extend_from_slice(&bytes);
        Ok(())
    }

    /// Assemble everything emitted so far.
    pub fn finalize(mut self) -> Result<EncodedCode, EncodingError> {
        self.flush()?;
        Ok(self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_encoding() {
        let mut encoder = X64Encoder::new().unwrap();
        encoder.zero_reg(AsmReg::RAX).unwrap();
        encoder.ret().unwrap();

        let code = encoder.finalize().unwrap();
        // xor eax, eax; ret
        assert_eq!(code.bytes, vec![0x31, 0xC0, 0xC3]);
        assert!(code.call_fixups.is_empty());
    }

    #[test]
    fn test_external_call_fixup() {
        let mut encoder = X64Encoder::new().unwrap();
        encoder.mov_reg_reg(AsmReg::RAX, AsmReg::RDI).unwrap();
        encoder.call_external().unwrap();
        encoder.ret().unwrap();

        let code = encoder.finalize().unwrap();
        // mov rax, rdi is three bytes, then E8 and the displacement.
        assert_eq!(code.call_fixups, vec![4]);
        assert_eq!(code.bytes[3], CALL_REL32);
        assert_eq!(&code.bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(code.bytes.last(), Some(&0xC3));
    }

    #[test]
    fn test_sized_loads() {
        let mut encoder = X64Encoder::new().unwrap();
        encoder.load_int(AsmReg::RDI, AsmReg::RDI, 0, 1, false).unwrap();
        encoder.load_int(AsmReg::gp(6), AsmReg::RAX, 8, 2, true).unwrap();
        encoder.load_int(AsmReg::gp(2), AsmReg::RAX, 16, 8, false).unwrap();
        encoder.load_float(AsmReg::xmm(0), AsmReg::R10, 0, 4).unwrap();
        encoder.load_float(AsmReg::xmm(1), AsmReg::R10, 0, 8).unwrap();
        assert!(!encoder.finalize().unwrap().bytes.is_empty());
    }

    #[test]
    fn test_rejects_wrong_bank_and_size() {
        let mut encoder = X64Encoder::new().unwrap();
        assert_eq!(
            encoder.load_float(AsmReg::RAX, AsmReg::RDI, 0, 4),
            Err(EncodingError::InvalidRegister(AsmReg::RAX))
        );
        assert_eq!(
            encoder.load_int(AsmReg::RAX, AsmReg::RDI, 0, 3, false),
            Err(EncodingError::UnsupportedOperandSize(3))
        );
    }
}
