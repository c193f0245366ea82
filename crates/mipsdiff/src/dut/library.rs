//! DUT simulation loaded from a shared library.
//!
//! The library (typically a Verilator build of the core plus a thin C shim)
//! must export:
//!
//! ```c
//! void     dut_reset(uint64_t timeout_cycles, const char *symbol_file);
//! void     dut_step(uint64_t cycles);
//! uint32_t dut_commit(void);
//! void     dut_getregs(dut_regs_t *regs);
//! void     dut_getpcs(uint32_t pcs[3]);
//! void     dut_sync_reg(uint32_t index, uint32_t value, bool sanctioned);
//! ```

use std::ffi::{CString, c_char};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use libloading::os::unix::{Library, RTLD_NOW, Symbol};
use mipsdiff_isa::NUM_GPRS;
use tracing::{debug, error};

use super::{Dut, DutError, SyncKind};
use crate::regs::{CommittedPcs, RECENT_PCS, RegisterFile};

/// Register block as laid out by the C shim (`dut_regs_t`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawRegs {
    pub pc: u32,
    pub gpr: [u32; NUM_GPRS],
    pub cause: u32,
    pub hi: u32,
    pub lo: u32,
    pub status: u32,
}

impl From<RawRegs> for RegisterFile {
    fn from(raw: RawRegs) -> Self {
        Self {
            pc: raw.pc,
            gpr: raw.gpr,
            cause: raw.cause,
            hi: raw.hi,
            lo: raw.lo,
            status: raw.status,
        }
    }
}

type DutReset = unsafe extern "C" fn(u64, *const c_char);
type DutStep = unsafe extern "C" fn(u64);
type DutCommit = unsafe extern "C" fn() -> u32;
type DutGetRegs = unsafe extern "C" fn(*mut RawRegs);
type DutGetPcs = unsafe extern "C" fn(*mut u32);
type DutSyncReg = unsafe extern "C" fn(u32, u32, bool);

/// Function table resolved from the library.
#[derive(Clone, Copy)]
struct DutApi {
    reset: DutReset,
    step: DutStep,
    commit: DutCommit,
    getregs: DutGetRegs,
    getpcs: DutGetPcs,
    sync_reg: DutSyncReg,
}

impl DutApi {
    unsafe fn load(lib: &Library) -> Result<Self, DutError> {
        unsafe {
            Ok(Self {
                reset: load_symbol(lib, b"dut_reset", "dut_reset")?,
                step: load_symbol(lib, b"dut_step", "dut_step")?,
                commit: load_symbol(lib, b"dut_commit", "dut_commit")?,
                getregs: load_symbol(lib, b"dut_getregs", "dut_getregs")?,
                getpcs: load_symbol(lib, b"dut_getpcs", "dut_getpcs")?,
                sync_reg: load_symbol(lib, b"dut_sync_reg", "dut_sync_reg")?,
            })
        }
    }
}

unsafe fn load_symbol<T: Copy>(
    lib: &Library,
    symbol: &'static [u8],
    label: &'static str,
) -> Result<T, DutError> {
    unsafe {
        let sym: Symbol<T> = lib.get(symbol).map_err(|e| {
            error!(symbol = label, "symbol not found in DUT library");
            DutError::SymbolNotFound(label, e)
        })?;
        Ok(*sym)
    }
}

/// DUT stepper backed by a dynamically loaded simulation library.
pub struct DutLibrary {
    api: DutApi,
    // Keeps the function pointers in `api` valid.
    _lib: Library,
}

impl DutLibrary {
    /// Load the simulation library at `path`.
    pub fn load(path: &Path) -> Result<Self, DutError> {
        if !path.exists() {
            return Err(DutError::LibraryNotFound(path.to_path_buf()));
        }
        // SAFETY: loading runs the library's initialisers; the DUT shim is
        // trusted to be a well-formed simulation library.
        let lib = unsafe { Library::open(Some(path), RTLD_NOW)? };
        let api = unsafe { DutApi::load(&lib)? };
        debug!(path = %path.display(), "loaded DUT library");
        Ok(Self { api, _lib: lib })
    }
}

impl Dut for DutLibrary {
    fn reset(&mut self, timeout_cycles: u64, symbol_file: &Path) -> Result<(), DutError> {
        let path = CString::new(symbol_file.as_os_str().as_bytes())
            .map_err(|_| DutError::InvalidPath(symbol_file.to_path_buf()))?;
        unsafe { (self.api.reset)(timeout_cycles, path.as_ptr()) };
        Ok(())
    }

    fn step(&mut self, cycles: u64) -> Result<(), DutError> {
        unsafe { (self.api.step)(cycles) };
        Ok(())
    }

    fn commit_count(&mut self) -> Result<u32, DutError> {
        Ok(unsafe { (self.api.commit)() })
    }

    fn get_registers(&mut self) -> Result<RegisterFile, DutError> {
        let mut raw = RawRegs::default();
        unsafe { (self.api.getregs)(&raw mut raw) };
        Ok(raw.into())
    }

    fn recent_pcs(&mut self) -> Result<CommittedPcs, DutError> {
        let mut pcs = [0u32; RECENT_PCS];
        unsafe { (self.api.getpcs)(pcs.as_mut_ptr()) };
        Ok(CommittedPcs(pcs))
    }

    fn sync_register(&mut self, index: usize, value: u32, kind: SyncKind) -> Result<(), DutError> {
        let reg = u32::try_from(index)
            .ok()
            .filter(|_| index < NUM_GPRS)
            .ok_or(DutError::InvalidRegister(index))?;
        unsafe { (self.api.sync_reg)(reg, value, kind.is_sanctioned()) };
        Ok(())
    }
}
