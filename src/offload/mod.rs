// This module implements the offload-injection pass. OffloadPass::run walks a host program
// once with the InjectRpc mutator: each loop tagged for the configured device is captured
// (closure), turned into a device function appended to the image, and replaced by a marshaled
// remote_run call whose argv offset is still a placeholder. Everything else is left alone and
// only rebuilt along paths that contained a region. If nothing was offloaded the program comes
// back untouched and no device code is produced. Otherwise the image is compiled once, the
// blob's section table resolves every placeholder, the blob is embedded into the host program,
// and the backpatcher prepends the runtime initialization and substitutes the offsets.
//
// All state of a run (image, placeholder registry, session, module state cell) lives in the
// InjectRpc value for that run; nothing is global.

//! Offload-injection pass.
//!
//! ## Pipeline
//! 1. [`closure`] - free scalars and buffers of a region
//! 2. [`device_fn`] - device function synthesis
//! 3. [`call_site`] - host call-site marshaling
//! 4. [`placeholder`] - symbolic blob offsets
//! 5. [`resolver`] - section table scan
//! 6. [`backpatch`] - offset substitution and runtime initialization
//!
//! [`runtime`] describes the runtime entry points the synthesized code calls.

pub mod backpatch;
pub mod call_site;
pub mod closure;
pub mod device_fn;
pub mod placeholder;
pub mod resolver;
pub mod runtime;

pub use call_site::{CallDescriptor, CallSite, CallSiteBuilder};
pub use closure::{BufferRef, Closure};
pub use device_fn::{device_function_name, synthesize_device_function};
pub use placeholder::{OffsetPlaceholder, PlaceholderRegistry};
pub use resolver::{resolve_offsets, Resolution};

use crate::core::{OffloadError, OffloadResult, OffloadSession, SessionStats};
use crate::device::{DeviceCompiler, DeviceImage, DeviceTarget, ElfImageCompiler, ElfInspector, ObjectInspector};
use crate::ir::{mutate, visit, DeviceApi, EmbeddedBuffer, Expr, Mutator, Stmt, Type};
use std::sync::Arc;

/// Name of the embedded cell holding the runtime's module handle.
pub const MODULE_STATE_NAME: &str = "offload_module_state";

/// Name of the embedded device code buffer.
pub const DEVICE_CODE_NAME: &str = "offload_device_code";

/// Pass configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffloadConfig {
    /// Loops tagged with this device are offloaded.
    pub device: DeviceApi,
    /// Target the device image is compiled for.
    pub target: DeviceTarget,
    /// Host pointer width, reported as the size of buffer arguments.
    pub pointer_bytes: u8,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            device: DeviceApi::Hexagon,
            target: DeviceTarget::simulator(),
            pointer_bytes: 8,
        }
    }
}

/// Compiled device code embedded in the host program.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceBlob {
    pub code: Arc<EmbeddedBuffer>,
    /// Resolved placeholder offsets, in section table order.
    pub symbols: Vec<(String, u32)>,
}

impl DeviceBlob {
    pub fn bytes(&self) -> &[u8] {
        &self.code.data
    }

    pub fn offset_of(&self, section: &str) -> Option<u32> {
        self.symbols.iter().find(|(name, _)| name == section).map(|(_, offset)| *offset)
    }
}

/// Result of a pass run.
#[derive(Debug, Clone)]
pub struct Injected {
    pub body: Stmt,
    pub image: DeviceImage,
    /// `None` when the program had no regions to offload.
    pub device_code: Option<DeviceBlob>,
    pub stats: SessionStats,
}

/// Rewrites tagged regions into remote calls, accumulating the device image.
struct InjectRpc<'c> {
    config: &'c OffloadConfig,
    image: DeviceImage,
    registry: PlaceholderRegistry,
    session: OffloadSession,
    state_cell: Arc<EmbeddedBuffer>,
    /// Value of the state cell, passed to every call site.
    state: Expr,
}

impl<'c> InjectRpc<'c> {
    fn new(config: &'c OffloadConfig) -> Self {
        let mut cell = EmbeddedBuffer::zeroed(MODULE_STATE_NAME, Type::handle());
        cell.data.resize(config.pointer_bytes as usize, 0);
        let state_cell = Arc::new(cell);
        let state = Expr::load_embedded(&state_cell, 0);
        Self {
            config,
            image: DeviceImage::new(config.device.name(), config.target),
            registry: PlaceholderRegistry::new(),
            session: OffloadSession::new(),
            state_cell,
            state,
        }
    }

    fn offload(&mut self, region_name: &str, region: &Stmt) -> OffloadResult<Stmt> {
        self.session.set_current_region(region_name);
        let closure = Closure::extract(region);
        let function = synthesize_device_function(region_name, region.clone(), &closure, &mut self.image);

        let mut builder = CallSiteBuilder {
            state: &self.state,
            registry: &mut self.registry,
            session: &mut self.session,
            pointer_bytes: self.config.pointer_bytes,
        };
        let site = builder.build(&function.name, &function.args, &closure)?;
        self.session.finish_region();
        Ok(site.stmt)
    }
}

impl Mutator for InjectRpc<'_> {
    type Error = OffloadError;

    fn mutate_stmt(&mut self, stmt: &Stmt) -> OffloadResult<Option<Stmt>> {
        match stmt {
            Stmt::For { name, device, .. } if *device == self.config.device => self.offload(name, stmt).map(Some),
            _ => visit::mutate_stmt_children(self, stmt),
        }
    }
}

/// The offload-injection pass.
pub struct OffloadPass<C = ElfImageCompiler, I = ElfInspector> {
    config: OffloadConfig,
    compiler: C,
    inspector: I,
}

impl OffloadPass {
    /// A pass using the reference ELF backend.
    pub fn new(config: OffloadConfig) -> Self {
        Self::with_backend(config, ElfImageCompiler::new(), ElfInspector)
    }
}

impl Default for OffloadPass {
    fn default() -> Self {
        Self::new(OffloadConfig::default())
    }
}

impl<C: DeviceCompiler, I: ObjectInspector> OffloadPass<C, I> {
    pub fn with_backend(config: OffloadConfig, compiler: C, inspector: I) -> Self {
        Self { config, compiler, inspector }
    }

    pub fn config(&self) -> &OffloadConfig {
        &self.config
    }

    /// Offload every region of `program` tagged for the configured device.
    pub fn run(&self, program: Stmt) -> OffloadResult<Injected> {
        let mut rpc = InjectRpc::new(&self.config);
        let body = mutate(&mut rpc, program)?;
        let InjectRpc { image, mut registry, mut session, state_cell, .. } = rpc;

        if image.is_empty() {
            log::info!("No {} regions to offload", self.config.device.name());
            return Ok(Injected { body, image, device_code: None, stats: session.into_stats() });
        }

        let init_offset = registry.reserve(runtime::text_section_name(runtime::INIT_RUNTIME_FUNCTION))?;
        session.record_reserved();

        let bytes = self.compiler.compile(&image)?;
        session.record_device_code(bytes.len());

        let resolution = resolve_offsets(&bytes, &mut registry, &self.inspector)?;
        session.record_sections_scanned(resolution.sections_scanned);
        session.record_resolved(resolution.resolved.len());

        let code = Arc::new(EmbeddedBuffer { name: DEVICE_CODE_NAME.to_string(), ty: Type::uint(8), data: bytes });
        let init = backpatch::init_call(&mut session, &state_cell, &code, init_offset);
        let body = backpatch::backpatch(body, &registry, init)?;

        log::info!(
            "Offloaded {} regions to {} ({} bytes of device code)",
            image.len(),
            image.target,
            code.len()
        );
        Ok(Injected {
            body,
            image,
            device_code: Some(DeviceBlob { code, symbols: resolution.resolved }),
            stats: session.into_stats(),
        })
    }
}
