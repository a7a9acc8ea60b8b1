//! Model: an ordered composition of modules forming a pipeline
//!
//! A model owns its modules and runs them in the fixed order they were
//! pushed; module *i* always reads module *i-1*'s freshly produced output
//! for the current hop. Named outputs resolve through a map built as
//! stages are pushed, so lookups never scan unrelated pipelines.
//!
//! Two operating modes:
//! - **Stationary**: single-shot evaluation, one `process()` per input.
//! - **Dynamic**: streaming evaluation; the caller feeds one hop of input
//!   per `process()` call and the model appends every aggregated output's
//!   frame whenever that output's trigger fires.

use std::collections::HashMap;

use log::warn;

use crate::bank::SignalBank;
use crate::error::{LoudnessError, Result};
use crate::module::Module;

/// Evaluation mode, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Stationary,
    /// Desired output/update frequency in Hz. Combined with the driving
    /// sample rate this determines the hop size.
    Dynamic { rate: f64 },
}

/// A pipeline of modules with named-output resolution.
pub struct Model {
    name: String,
    mode: Mode,
    modules: Vec<Box<dyn Module>>,
    output_names: Vec<String>,
    output_index: HashMap<String, usize>,
    aggregated_outputs: Vec<usize>,
    /// Shape fixed at initialize; process() input must match it
    input_shape: Option<(usize, usize, usize, usize)>,
    hop_size: usize,
    initialized: bool,
}

impl Model {
    /// Construct a single-shot model.
    pub fn stationary(name: &str) -> Self {
        Self::with_mode(name, Mode::Stationary)
    }

    /// Construct a streaming model updating at `rate` Hz.
    pub fn dynamic(name: &str, rate: f64) -> Self {
        Self::with_mode(name, Mode::Dynamic { rate })
    }

    fn with_mode(name: &str, mode: Mode) -> Self {
        Self {
            name: name.to_string(),
            mode,
            modules: Vec::new(),
            output_names: Vec::new(),
            output_index: HashMap::new(),
            aggregated_outputs: Vec::new(),
            input_shape: None,
            hop_size: 0,
            initialized: false,
        }
    }

    /// Append a stage to the pipeline under a public output name.
    ///
    /// Stages run in push order. Names must be unique and the pipeline is
    /// frozen once `initialize()` has succeeded.
    pub fn push(&mut self, output_name: &str, module: Box<dyn Module>) -> Result<()> {
        if self.initialized {
            return Err(LoudnessError::InvalidParameter {
                module: self.name.clone(),
                details: "cannot add modules after initialize()".to_string(),
            });
        }
        if self.output_index.contains_key(output_name) {
            return Err(LoudnessError::DuplicateOutput {
                name: output_name.to_string(),
            });
        }
        self.output_index
            .insert(output_name.to_string(), self.modules.len());
        self.output_names.push(output_name.to_string());
        self.modules.push(module);
        Ok(())
    }

    /// Initialise every stage in order, feeding each the previous stage's
    /// output bank. Short-circuits on the first failing stage, leaving the
    /// model unusable for `process()`.
    ///
    /// For dynamic models the effective rate is corrected to
    /// `fs / input.num_samples()` when the requested rate does not divide
    /// the driving sample rate into the given hop.
    pub fn initialize(&mut self, input: &SignalBank) -> Result<()> {
        self.initialized = false;
        if !input.is_initialized() {
            return Err(LoudnessError::NotInitialized {
                what: "input SignalBank".to_string(),
            });
        }
        if self.modules.is_empty() {
            return Err(LoudnessError::InvalidParameter {
                module: self.name.clone(),
                details: "model has no modules".to_string(),
            });
        }

        if let Mode::Dynamic { rate } = self.mode {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(LoudnessError::InvalidParameter {
                    module: self.name.clone(),
                    details: format!("dynamic model rate must be positive, got {}", rate),
                });
            }
            self.hop_size = input.num_samples();
            let effective_rate = input.fs() / self.hop_size as f64;
            let requested_hop = (input.fs() / rate).round() as usize;
            if requested_hop != self.hop_size {
                warn!(
                    "{}: requested rate {} Hz implies a hop of {} samples but the \
                     input block is {}; correcting rate to {} Hz",
                    self.name, rate, requested_hop, self.hop_size, effective_rate
                );
            }
            self.mode = Mode::Dynamic {
                rate: effective_rate,
            };
        }

        self.modules[0].initialize(input)?;
        for i in 1..self.modules.len() {
            let (upstream, rest) = self.modules.split_at_mut(i);
            rest[0].initialize(upstream[i - 1].output())?;
        }

        self.input_shape = Some((
            input.num_sources(),
            input.num_ears(),
            input.num_channels(),
            input.num_samples(),
        ));
        self.initialized = true;
        Ok(())
    }

    /// Run the whole pipeline for one hop.
    ///
    /// The input bank must be the same shape as the one passed to
    /// `initialize()` and its trigger must reflect whether it holds new
    /// data. After the chain has run, every output marked for aggregation
    /// whose trigger fired has its frame appended.
    pub fn process(&mut self, input: &SignalBank) {
        assert!(
            self.initialized,
            "{}: process() called before successful initialize()",
            self.name
        );
        let shape = (
            input.num_sources(),
            input.num_ears(),
            input.num_channels(),
            input.num_samples(),
        );
        assert!(
            self.input_shape == Some(shape),
            "{}: input shape {:?} differs from the shape fixed at initialize() {:?}",
            self.name,
            shape,
            self.input_shape.unwrap()
        );

        self.modules[0].process(input);
        for i in 1..self.modules.len() {
            let (upstream, rest) = self.modules.split_at_mut(i);
            rest[0].process(upstream[i - 1].output());
        }

        for &idx in &self.aggregated_outputs {
            let module = &mut self.modules[idx];
            if module.output().trig() {
                module.output_mut().aggregate();
            }
        }
    }

    /// Reset every module in order. Output banks, triggers and
    /// aggregation buffers are cleared; no buffer is reallocated, so an
    /// abandoned run can be restarted on the same model instance.
    pub fn reset(&mut self) {
        for module in &mut self.modules {
            module.reset();
        }
    }

    /// Resolve a public output name to the producing module's bank.
    pub fn get_output(&self, name: &str) -> Result<&SignalBank> {
        let idx = self
            .output_index
            .get(name)
            .ok_or_else(|| LoudnessError::UnknownOutput {
                name: name.to_string(),
            })?;
        Ok(self.modules[*idx].output())
    }

    /// Mark a named output for per-trigger aggregation. Dynamic models
    /// only; idempotent for an already-marked name.
    pub fn aggregate_output(&mut self, name: &str) -> Result<()> {
        if self.is_stationary() {
            return Err(LoudnessError::InvalidParameter {
                module: self.name.clone(),
                details: "aggregation only applies to dynamic models".to_string(),
            });
        }
        let idx = *self
            .output_index
            .get(name)
            .ok_or_else(|| LoudnessError::UnknownOutput {
                name: name.to_string(),
            })?;
        if !self.aggregated_outputs.contains(&idx) {
            self.aggregated_outputs.push(idx);
        }
        Ok(())
    }

    /// Stop aggregating a named output. Frames already accumulated stay
    /// in the bank.
    pub fn stop_aggregating(&mut self, name: &str) -> Result<()> {
        let idx = *self
            .output_index
            .get(name)
            .ok_or_else(|| LoudnessError::UnknownOutput {
                name: name.to_string(),
            })?;
        self.aggregated_outputs.retain(|&i| i != idx);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.mode, Mode::Dynamic { .. })
    }

    pub fn is_stationary(&self) -> bool {
        !self.is_dynamic()
    }

    /// Output/update frequency in Hz. Meaningful only for dynamic models;
    /// after `initialize()` this is the corrected effective rate.
    pub fn rate(&self) -> f64 {
        match self.mode {
            Mode::Dynamic { rate } => rate,
            Mode::Stationary => 0.0,
        }
    }

    /// Samples consumed per `process()` call (dynamic models, after
    /// `initialize()`).
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Number of pipeline stages
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Public output names in pipeline order
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_module_common;
    use crate::module::ModuleBase;

    /// Minimal rate-preserving stage: multiplies every sample by a gain.
    struct Scale {
        base: ModuleBase,
        gain: f64,
    }

    impl Scale {
        fn new(gain: f64) -> Self {
            Self {
                base: ModuleBase::new("Scale"),
                gain,
            }
        }
    }

    impl Module for Scale {
        impl_module_common!();

        fn initialize(&mut self, input: &SignalBank) -> Result<()> {
            self.base.begin_initialize();
            self.base.output_mut().initialize_from(input)?;
            self.base.finish_initialize();
            Ok(())
        }

        fn process(&mut self, input: &SignalBank) {
            if !self.base.begin_process(input) {
                return;
            }
            let scaled: Vec<f64> = input.signals().iter().map(|x| x * self.gain).collect();
            self.base.output_mut().set_signals(&scaled);
        }

        fn reset(&mut self) {
            self.base.reset_output();
        }
    }

    fn triggered_input(value: f64) -> SignalBank {
        let mut input = SignalBank::with_shape(1, 1, 1, 4, 48000.0).unwrap();
        input.set_signal(0, 0, 0, &[value; 4]);
        input.set_trig(true);
        input
    }

    #[test]
    fn test_pipeline_order_and_output_lookup() {
        let mut model = Model::stationary("TwoStage");
        model.push("Half", Box::new(Scale::new(0.5))).unwrap();
        model.push("Double", Box::new(Scale::new(2.0))).unwrap();

        let input = triggered_input(1.0);
        model.initialize(&input).unwrap();
        model.process(&input);

        let half = model.get_output("Half").unwrap();
        assert_eq!(half.signal(0, 0, 0), &[0.5; 4]);
        let double = model.get_output("Double").unwrap();
        assert_eq!(double.signal(0, 0, 0), &[1.0; 4]);
    }

    #[test]
    fn test_unknown_output_is_error() {
        let mut model = Model::stationary("M");
        model.push("Out", Box::new(Scale::new(1.0))).unwrap();
        let err = model.get_output("Missing").unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_OUTPUT");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut model = Model::stationary("M");
        model.push("Out", Box::new(Scale::new(1.0))).unwrap();
        let err = model.push("Out", Box::new(Scale::new(2.0))).unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_OUTPUT");
    }

    #[test]
    fn test_push_after_initialize_rejected() {
        let mut model = Model::stationary("M");
        model.push("Out", Box::new(Scale::new(1.0))).unwrap();
        let input = triggered_input(1.0);
        model.initialize(&input).unwrap();
        assert!(model.push("Late", Box::new(Scale::new(1.0))).is_err());
    }

    #[test]
    fn test_empty_model_fails_to_initialize() {
        let mut model = Model::stationary("Empty");
        let input = triggered_input(0.0);
        assert!(model.initialize(&input).is_err());
        assert!(!model.is_initialized());
    }

    #[test]
    fn test_dynamic_rate_correction() {
        let mut model = Model::dynamic("D", 1000.0);
        model.push("Out", Box::new(Scale::new(1.0))).unwrap();
        // 4-sample hops at 48 kHz actually update at 12 kHz
        let input = triggered_input(0.0);
        model.initialize(&input).unwrap();
        assert!(model.is_dynamic());
        assert_eq!(model.hop_size(), 4);
        assert_eq!(model.rate(), 12000.0);
    }

    #[test]
    fn test_aggregation_on_stationary_model_is_error() {
        let mut model = Model::stationary("S");
        model.push("Out", Box::new(Scale::new(1.0))).unwrap();
        assert!(model.aggregate_output("Out").is_err());
    }

    #[test]
    fn test_aggregation_counts_triggers() {
        let mut model = Model::dynamic("D", 12000.0);
        model.push("Out", Box::new(Scale::new(2.0))).unwrap();
        model.aggregate_output("Out").unwrap();

        let mut input = triggered_input(1.0);
        model.initialize(&input).unwrap();

        // three triggered hops, then one silent hop
        for _ in 0..3 {
            model.process(&input);
        }
        input.set_trig(false);
        model.process(&input);

        let out = model.get_output("Out").unwrap();
        assert_eq!(out.num_aggregated_frames(), 3);
    }

    #[test]
    #[should_panic(expected = "differs from the shape fixed at initialize")]
    fn test_shape_change_mid_stream_panics() {
        let mut model = Model::stationary("M");
        model.push("Out", Box::new(Scale::new(1.0))).unwrap();
        let input = triggered_input(1.0);
        model.initialize(&input).unwrap();

        let mut other = SignalBank::with_shape(1, 1, 1, 8, 48000.0).unwrap();
        other.set_trig(true);
        model.process(&other);
    }
}
