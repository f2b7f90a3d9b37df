//! Dispatch Loop
//!
//! Two execution tiers share one [`Cpu`]: the interpreter runs blocks from
//! the [`BlockCache`], and the [`Jit`] compiles cached blocks that are long
//! enough. A compiled block always wins over interpretation for its address.

use tracing::{debug, info};

use super::{block::BlockCache, Cpu};
use crate::{config::EmulatorConfig, error::VmError, jit::Jit};

/// Counters collected by [`Emulator::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Blocks executed by the interpreter.
    pub blocks_interpreted: u64,
    /// Instructions executed by the interpreter.
    pub instructions_interpreted: u64,
    /// Invocations of compiled blocks.
    pub native_calls: u64,
    /// Blocks translated to native code.
    pub blocks_compiled: u64,
}

/// Owns the block caches and drives a [`Cpu`] to completion.
pub struct Emulator {
    config: EmulatorConfig,
    blocks: BlockCache,
    jit: Option<Jit>,
    stats: DispatchStats,
}

impl Emulator {
    /// Create an emulator. The JIT backend is only set up in
    /// [`crate::ExecMode::Jit`].
    pub fn new(config: EmulatorConfig) -> Result<Self, VmError> {
        let jit = if config.jit_enabled() {
            Some(Jit::new(config.unsupported).map_err(VmError::JitSetup)?)
        } else {
            None
        };
        Ok(Self {
            blocks: BlockCache::new(config.mode),
            config,
            jit,
            stats: DispatchStats::default(),
        })
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Decoded block cache.
    pub fn blocks(&self) -> &BlockCache {
        &self.blocks
    }

    /// Run until the guest exits or breaks, or a fault or translation
    /// failure stops execution.
    ///
    /// The configured unsupported-instruction policy replaces the one held
    /// by `cpu`, so both tiers apply the same policy.
    pub fn run(&mut self, cpu: &mut Cpu<'_>) -> Result<(), VmError> {
        cpu.unsupported = self.config.unsupported;
        info!(
            mode = ?self.config.mode,
            entry = format_args!("{:#x}", cpu.pc()),
            "starting emulation"
        );
        let result = self.run_loop(cpu);
        debug!(
            blocks_interpreted = self.stats.blocks_interpreted,
            instructions_interpreted = self.stats.instructions_interpreted,
            native_calls = self.stats.native_calls,
            blocks_compiled = self.stats.blocks_compiled,
            cached_blocks = self.blocks.len(),
            "dispatch finished"
        );
        result
    }

    /// Run and reduce the outcome to a process status code: 0 when the
    /// guest stopped on its own, otherwise [`VmError::status_code`].
    pub fn run_simulation(&mut self, cpu: &mut Cpu<'_>) -> i32 {
        match self.run(cpu) {
            Ok(()) => 0,
            Err(err) => {
                tracing::error!("{err}");
                err.status_code()
            }
        }
    }

    fn run_loop(&mut self, cpu: &mut Cpu<'_>) -> Result<(), VmError> {
        while !cpu.is_done() {
            self.dispatch(cpu)?;
            if let Some(fault) = cpu.take_fault() {
                return Err(fault.into());
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, cpu: &mut Cpu<'_>) -> Result<(), VmError> {
        let pc = cpu.pc();

        if let Some(jit) = self.jit.as_mut() {
            if let Some(native) = jit.get(pc) {
                self.stats.native_calls += 1;
                // SAFETY: `jit` owns the code and outlives the call.
                unsafe { native.call(cpu) };
                return Ok(());
            }

            // Only blocks seen before are compiled.
            if let Some(block) = self.blocks.get(pc) {
                if block.len() >= self.config.hot_threshold {
                    let native = jit
                        .translate(block)
                        .map_err(|source| VmError::Translation { pc, source })?;
                    self.stats.blocks_compiled += 1;
                    self.stats.native_calls += 1;
                    // SAFETY: as above.
                    unsafe { native.call(cpu) };
                    return Ok(());
                }
            }
        }

        let block = self.blocks.lookup(cpu.memory(), pc)?;
        self.stats.blocks_interpreted += 1;
        self.stats.instructions_interpreted += block.len() as u64;
        cpu.interpret(block);
        Ok(())
    }
}
