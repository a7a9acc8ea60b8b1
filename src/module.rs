//! Module trait: the uniform processing-unit contract
//!
//! Every pipeline stage implements `Module`: configure via its own
//! constructor, then `initialize()` against an input bank (validates the
//! input contract and allocates the owned output bank), then any number of
//! `process()` calls, each consuming exactly one hop of new input.
//! `reset()` restores the initialised state in place so the module can be
//! reused without reallocating.
//!
//! Processing is gated on the input bank's trigger: when the upstream
//! stage produced no new frame this hop, the module clears its own output
//! trigger and leaves its output untouched. This is what lets audio-rate
//! and frame-rate stages coexist in one chain.

use crate::bank::SignalBank;
use crate::error::Result;

/// A single computational stage in a processing pipeline.
///
/// Implementations own exactly one output `SignalBank` and never mutate
/// their input. Configuration errors surface from `initialize()`;
/// `process()` assumes an initialised module and panics otherwise.
pub trait Module {
    /// Short human-readable module name (e.g. "FrameGenerator")
    fn name(&self) -> &str;

    /// True once `initialize()` has succeeded
    fn is_initialized(&self) -> bool;

    /// Validate the input contract and allocate the output bank.
    ///
    /// On error the module stays uninitialised and must not be processed.
    fn initialize(&mut self, input: &SignalBank) -> Result<()>;

    /// Consume one hop of input and update the output bank.
    fn process(&mut self, input: &SignalBank);

    /// Clear internal algorithmic state and the output bank's contents
    /// and trigger, without deallocating. The module stays initialised.
    fn reset(&mut self);

    /// The owned output bank
    fn output(&self) -> &SignalBank;

    /// Mutable access to the owned output bank (used by the model for
    /// aggregation)
    fn output_mut(&mut self) -> &mut SignalBank;
}

/// State shared by every module implementation: the name, the lifecycle
/// flag and the owned output bank.
#[derive(Debug, Default)]
pub struct ModuleBase {
    name: String,
    initialized: bool,
    output: SignalBank,
}

impl ModuleBase {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            initialized: false,
            output: SignalBank::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn output(&self) -> &SignalBank {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut SignalBank {
        &mut self.output
    }

    /// Drop back to the uninitialised state. Called at the top of every
    /// `initialize()` so a failed re-initialisation leaves the module
    /// unusable rather than half-configured.
    pub fn begin_initialize(&mut self) {
        self.initialized = false;
    }

    /// Mark initialisation as complete.
    pub fn finish_initialize(&mut self) {
        self.initialized = true;
    }

    /// Trigger gating at the top of `process()`.
    ///
    /// Returns true when the module should run this hop. The output
    /// trigger is provisionally set for rate-preserving modules;
    /// rate-converting modules overwrite it once they know whether a new
    /// frame came out.
    pub fn begin_process(&mut self, input: &SignalBank) -> bool {
        assert!(
            self.initialized,
            "{}: process() called before successful initialize()",
            self.name
        );
        if input.trig() {
            self.output.set_trig(true);
            true
        } else {
            self.output.set_trig(false);
            false
        }
    }

    /// Clear the output contents, trigger and aggregation.
    pub fn reset_output(&mut self) {
        self.output.clear();
    }
}

/// Implements the boilerplate `Module` methods that simply delegate to the
/// embedded `ModuleBase` field.
#[macro_export]
macro_rules! impl_module_common {
    () => {
        fn name(&self) -> &str {
            self.base.name()
        }

        fn is_initialized(&self) -> bool {
            self.base.is_initialized()
        }

        fn output(&self) -> &$crate::bank::SignalBank {
            self.base.output()
        }

        fn output_mut(&mut self) -> &mut $crate::bank::SignalBank {
            self.base.output_mut()
        }
    };
}
