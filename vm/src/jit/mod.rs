//! Native compilation of hot basic blocks.
//!
//! Each [`BasicBlock`] is lowered to one Cranelift function that takes the
//! [`Cpu`] by pointer, updates its registers in place and stores the
//! successor pc before returning. Compiled blocks are cached by start
//! address for the lifetime of the [`Jit`].

mod helpers;
mod translator;

use std::mem::{offset_of, ManuallyDrop};

use cranelift_codegen::{
    ir::AbiParam,
    settings::{self, Configurable, SetError},
    CodegenError, Context,
};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, FuncId, Linkage, Module, ModuleError};
use hashbrown::HashMap;
use strum::IntoEnumIterator;
use thiserror::Error;
use tracing::{debug, trace, Level};

use self::{
    helpers::{register_symbols, Helper},
    translator::Translator,
};
use crate::{
    config::UnsupportedPolicy,
    emulator::{BasicBlock, Cpu},
};

/// Field offsets of the guest state read and written by native code.
const REGS_OFFSET: i32 = offset_of!(Cpu<'static>, regs) as i32;
const PC_OFFSET: i32 = offset_of!(Cpu<'static>, pc) as i32;
const DONE_OFFSET: i32 = offset_of!(Cpu<'static>, done) as i32;

/// Signature of a compiled block.
pub type NativeFn = unsafe extern "C" fn(&mut Cpu<'_>);

/// Errors that may arise while setting up the JIT or compiling a block.
#[derive(Debug, Error)]
pub enum JitError {
    /// Failures setting flags.
    #[error("failed to set flag: {0}")]
    Setting(#[from] SetError),
    /// Native compilation unsupported on the current arch/os.
    #[error("native platform unsupported: {0}")]
    UnsupportedPlatform(&'static str),
    /// Building the target ISA failed.
    #[error("unable to build target isa: {0}")]
    Codegen(#[from] CodegenError),
    /// Declaring, defining or finalizing a function failed.
    #[error("module error: {0}")]
    Module(#[from] ModuleError),
}

/// A compiled basic block.
#[derive(Clone, Copy)]
pub struct NativeBlock {
    func: NativeFn,
    /// Address of the first guest instruction.
    pub start: u32,
    /// Number of guest instructions covered.
    pub len: usize,
}

impl NativeBlock {
    /// Run the block over `cpu`.
    ///
    /// # Safety
    ///
    /// The [`Jit`] that compiled this block must still be alive.
    #[inline(always)]
    pub unsafe fn call(&self, cpu: &mut Cpu<'_>) {
        (self.func)(cpu)
    }
}

impl std::fmt::Debug for NativeBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBlock")
            .field("start", &format_args!("{:#x}", self.start))
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// Block compiler and cache of compiled code.
pub struct Jit {
    /// Released explicitly in `Drop`, which also frees the generated code.
    module: ManuallyDrop<JITModule>,
    ctx: Context,
    builder_ctx: FunctionBuilderContext,
    /// Imported call-outs, indexed by [`Helper`].
    helpers: Vec<FuncId>,
    unsupported: UnsupportedPolicy,
    blocks: HashMap<u32, NativeBlock>,
}

impl Jit {
    /// Create a JIT for the host ISA.
    pub fn new(unsupported: UnsupportedPolicy) -> Result<Self, JitError> {
        let mut flag_builder = settings::builder();
        flag_builder.set("use_colocated_libcalls", "false")?;
        flag_builder.set("is_pic", "false")?;
        flag_builder.set("opt_level", "speed")?;

        let isa_builder = cranelift_native::builder().map_err(JitError::UnsupportedPlatform)?;
        let isa = isa_builder.finish(settings::Flags::new(flag_builder))?;

        let mut builder = JITBuilder::with_isa(isa, default_libcall_names());
        register_symbols(&mut builder);
        let mut module = JITModule::new(builder);

        let helpers = Helper::iter()
            .map(|helper| {
                let sig = helper.signature(&module);
                module.declare_function(helper.symbol(), Linkage::Import, &sig)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            ctx: module.make_context(),
            module: ManuallyDrop::new(module),
            builder_ctx: FunctionBuilderContext::new(),
            helpers,
            unsupported,
            blocks: HashMap::new(),
        })
    }

    /// Compiled block starting at `pc`, if any.
    #[inline(always)]
    pub fn get(&self, pc: u32) -> Option<NativeBlock> {
        self.blocks.get(&pc).copied()
    }

    /// Number of compiled blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Compile `block`, or return the cached compilation of its start address.
    pub fn translate(&mut self, block: &BasicBlock) -> Result<NativeBlock, JitError> {
        if let Some(native) = self.get(block.start) {
            return Ok(native);
        }

        let result = self.compile(block);
        self.module.clear_context(&mut self.ctx);
        let func = result?;

        let native = NativeBlock {
            func,
            start: block.start,
            len: block.len(),
        };
        self.blocks.insert(block.start, native);
        debug!(
            start = format_args!("{:#x}", block.start),
            len = block.len(),
            "compiled block"
        );
        Ok(native)
    }

    fn compile(&mut self, block: &BasicBlock) -> Result<NativeFn, JitError> {
        let ptr = self.module.target_config().pointer_type();
        self.ctx.func.signature.params.push(AbiParam::new(ptr));

        let helpers = self
            .helpers
            .iter()
            .map(|id| self.module.declare_func_in_func(*id, &mut self.ctx.func))
            .collect();

        let builder = FunctionBuilder::new(&mut self.ctx.func, &mut self.builder_ctx);
        let mut translator = Translator::new(builder, helpers, self.unsupported);
        translator.lower_block(block);
        translator.finish();

        let disasm = tracing::enabled!(Level::TRACE);
        if disasm {
            trace!(
                start = format_args!("{:#x}", block.start),
                "lowered block\n{}",
                self.ctx.func.display()
            );
        }
        self.ctx.set_disasm(disasm);

        let id = self
            .module
            .declare_anonymous_function(&self.ctx.func.signature)?;
        self.module.define_function(id, &mut self.ctx)?;
        if let Some(vcode) = self.ctx.compiled_code().and_then(|code| code.vcode.as_ref()) {
            trace!(
                start = format_args!("{:#x}", block.start),
                "native code\n{vcode}"
            );
        }
        self.module.finalize_definitions()?;
        let code = self.module.get_finalized_function(id);

        // SAFETY: the function was built with a single pointer parameter and
        // no results, which is the ABI of `NativeFn`.
        Ok(unsafe { std::mem::transmute::<*const u8, NativeFn>(code) })
    }
}

impl Drop for Jit {
    fn drop(&mut self) {
        // SAFETY: the module is not used after this point, and native blocks
        // must not outlive the JIT that produced them.
        unsafe { ManuallyDrop::take(&mut self.module).free_memory() }
    }
}
