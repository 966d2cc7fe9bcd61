// This module implements the argument half of the System V AMD64 calling convention, which the
// simulator device backend needs to build argv thunks: each thunk unpacks a runtime argument
// vector and calls the device function with a native signature. Integer and pointer arguments
// pass in RDI, RSI, RDX, RCX, R8, R9; floating-point arguments pass in XMM0-XMM7; the rest go
// to 8-byte stack slots in order. SysVAssigner hands out those locations one CCAssignment at a
// time and reports the stack space the outgoing call needs, rounded to 16 bytes as the ABI
// requires.

//! System V x86-64 argument assignment.

use std::fmt;

/// Register banks for different register types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegBank {
    GeneralPurpose = 0,
    Xmm = 1,
}

/// A machine register identified by bank and hardware number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsmReg {
    pub bank: RegBank,
    pub id: u8,
}

impl AsmReg {
    pub const RAX: AsmReg = AsmReg::gp(0);
    pub const RSP: AsmReg = AsmReg::gp(4);
    pub const RDI: AsmReg = AsmReg::gp(7);
    pub const R10: AsmReg = AsmReg::gp(10);

    pub const fn gp(id: u8) -> Self {
        Self { bank: RegBank::GeneralPurpose, id }
    }

    pub const fn xmm(id: u8) -> Self {
        Self { bank: RegBank::Xmm, id }
    }
}

impl fmt::Display for AsmReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const GP_NAMES: [&str; 16] = [
            "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12", "r13", "r14",
            "r15",
        ];
        match self.bank {
            RegBank::GeneralPurpose => match GP_NAMES.get(self.id as usize) {
                Some(name) => f.write_str(name),
                None => write!(f, "gp{}", self.id),
            },
            RegBank::Xmm => write!(f, "xmm{}", self.id),
        }
    }
}

/// Argument assignment result from calling convention analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CCAssignment {
    /// Register bank this argument belongs to.
    pub bank: RegBank,
    /// Size of the argument in bytes.
    pub size: u32,
    /// Assigned register (if any).
    pub reg: Option<AsmReg>,
    /// Offset from the stack pointer at the call (if assigned to stack).
    pub stack_off: Option<u32>,
}

impl CCAssignment {
    pub fn new(bank: RegBank, size: u32) -> Self {
        Self { bank, size, reg: None, stack_off: None }
    }
}

/// Trait for calling convention argument assignment.
pub trait CCAssigner {
    /// Assign an argument according to the calling convention.
    fn assign_arg(&mut self, arg: &mut CCAssignment);

    /// Reset state for a new call.
    fn reset(&mut self);

    /// Get the total stack space needed for arguments.
    fn stack_size(&self) -> u32;
}

/// System V x86-64 calling convention assigner.
#[derive(Debug, Default)]
pub struct SysVAssigner {
    /// Current GP argument register index.
    gp_cnt: usize,
    /// Current XMM argument register index.
    xmm_cnt: usize,
    /// Current stack offset for arguments.
    stack: u32,
}

impl SysVAssigner {
    /// System V x86-64 GP argument registers.
    pub const GP_ARG_REGS: [AsmReg; 6] = [
        AsmReg::gp(7), // RDI
        AsmReg::gp(6), // RSI
        AsmReg::gp(2), // RDX
        AsmReg::gp(1), // RCX
        AsmReg::gp(8), // R8
        AsmReg::gp(9), // R9
    ];

    /// System V x86-64 XMM argument registers.
    pub const XMM_ARG_REGS: [AsmReg; 8] = [
        AsmReg::xmm(0),
        AsmReg::xmm(1),
        AsmReg::xmm(2),
        AsmReg::xmm(3),
        AsmReg::xmm(4),
        AsmReg::xmm(5),
        AsmReg::xmm(6),
        AsmReg::xmm(7),
    ];

    pub fn new() -> Self {
        Self::default()
    }

    /// Number of GP argument registers used so far.
    pub fn gp_used(&self) -> usize {
        self.gp_cnt
    }

    /// Number of XMM argument registers used so far.
    pub fn xmm_used(&self) -> usize {
        self.xmm_cnt
    }

    fn align_up(value: u32, align: u32) -> u32 {
        (value + align - 1) & !(align - 1)
    }

    fn assign_stack(&mut self, arg: &mut CCAssignment) {
        arg.stack_off = Some(self.stack);
        self.stack += Self::align_up(arg.size.max(1), 8);
    }
}

impl CCAssigner for SysVAssigner {
    fn assign_arg(&mut self, arg: &mut CCAssignment) {
        match arg.bank {
            RegBank::GeneralPurpose => {
                if let Some(&reg) = Self::GP_ARG_REGS.get(self.gp_cnt) {
                    arg.reg = Some(reg);
                    self.gp_cnt += 1;
                } else {
                    self.assign_stack(arg);
                }
            }
            RegBank::Xmm => {
                if let Some(&reg) = Self::XMM_ARG_REGS.get(self.xmm_cnt) {
                    arg.reg = Some(reg);
                    self.xmm_cnt += 1;
                } else {
                    self.assign_stack(arg);
                }
            }
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn stack_size(&self) -> u32 {
        Self::align_up(self.stack, 16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gp_arguments_fill_registers_then_stack() {
        let mut assigner = SysVAssigner::new();

        for expected in SysVAssigner::GP_ARG_REGS {
            let mut arg = CCAssignment::new(RegBank::GeneralPurpose, 8);
            assigner.assign_arg(&mut arg);
            assert_eq!(arg.reg, Some(expected));
            assert_eq!(arg.stack_off, None);
        }

        let mut seventh = CCAssignment::new(RegBank::GeneralPurpose, 4);
        assigner.assign_arg(&mut seventh);
        assert_eq!(seventh.reg, None);
        assert_eq!(seventh.stack_off, Some(0));

        let mut eighth = CCAssignment::new(RegBank::GeneralPurpose, 8);
        assigner.assign_arg(&mut eighth);
        assert_eq!(eighth.stack_off, Some(8));
        assert_eq!(assigner.stack_size(), 16);
    }

    #[test]
    fn banks_are_counted_separately() {
        let mut assigner = SysVAssigner::new();

        let mut f = CCAssignment::new(RegBank::Xmm, 4);
        let mut p = CCAssignment::new(RegBank::GeneralPurpose, 8);
        assigner.assign_arg(&mut f);
        assigner.assign_arg(&mut p);

        assert_eq!(f.reg, Some(AsmReg::xmm(0)));
        assert_eq!(p.reg, Some(AsmReg::RDI));
        assert_eq!((assigner.gp_used(), assigner.xmm_used()), (1, 1));

        assigner.reset();
        assert_eq!(assigner.stack_size(), 0);
        assert_eq!(assigner.gp_used(), 0);
    }

    #[test]
    fn ninth_float_goes_to_stack() {
        let mut assigner = SysVAssigner::new();
        for _ in 0..8 {
            let mut arg = CCAssignment::new(RegBank::Xmm, 8);
            assigner.assign_arg(&mut arg);
            assert!(arg.reg.is_some());
        }
        let mut ninth = CCAssignment::new(RegBank::Xmm, 8);
        assigner.assign_arg(&mut ninth);
        assert_eq!(ninth.reg, None);
        assert_eq!(ninth.stack_off, Some(0));
    }

    #[test]
    fn register_names() {
        assert_eq!(AsmReg::RDI.to_string(), "rdi");
        assert_eq!(AsmReg::gp(9).to_string(), "r9");
        assert_eq!(AsmReg::xmm(3).to_string(), "xmm3");
    }
}
