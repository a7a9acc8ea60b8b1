//! End-to-end pipeline tests: streaming equivalence, multi-rate framing
//! and model lifecycle behaviour.

use approx::assert_abs_diff_eq;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use loudness_core::modules::{
    Fir, FrameGenerator, FrameGeneratorConfig, Normalisation, Window, WindowConfig, WindowShape,
};
use loudness_core::{Model, Module, SignalBank};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn noise(len: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn hop_bank(n_samples: usize, fs: f64) -> SignalBank {
    let mut bank = SignalBank::with_shape(1, 1, 1, n_samples, fs).unwrap();
    bank.set_trig(true);
    bank
}

/// Feeding a filter the same signal in hops or in one pass must give the
/// same output, because the delay line carries state across hops.
#[test]
fn test_fir_streaming_matches_single_pass() {
    let coefs = noise(128, 1);
    let signal = noise(1024, 2);

    let mut single = Fir::new(&coefs);
    let mut whole = hop_bank(1024, 48000.0);
    whole.set_signal(0, 0, 0, &signal);
    single.initialize(&whole).unwrap();
    single.process(&whole);
    let reference = single.output().signal(0, 0, 0).to_vec();

    let mut streamed = Fir::new(&coefs);
    let mut hop = hop_bank(512, 48000.0);
    streamed.initialize(&hop).unwrap();
    for (i, part) in signal.chunks(512).enumerate() {
        hop.set_signal(0, 0, 0, part);
        streamed.process(&hop);
        let out = streamed.output().signal(0, 0, 0);
        for (j, &y) in out.iter().enumerate() {
            assert_abs_diff_eq!(y, reference[i * 512 + j], epsilon = 1e-9);
        }
    }
}

/// Centred framing is equivalent to slicing the zero-padded input stream
/// `y = [ceil((frame-1)/2) zeros, x...]` at multiples of the hop.
#[test]
fn test_centred_frames_slice_the_padded_stream() {
    let frame_size = 2048;
    let hop_size = 32;
    let padding = (frame_size - 1) / 2 + 1; // ceil(2047 / 2)

    let mut framer = FrameGenerator::new(FrameGeneratorConfig {
        frame_size,
        hop_size,
        start_at_window_centre: true,
    });
    let mut hop = hop_bank(32, 48000.0);
    framer.initialize(&hop).unwrap();
    assert_abs_diff_eq!(framer.output().frame_rate(), 1500.0);

    let mut frames: Vec<Vec<f64>> = Vec::new();
    for block in 0..48usize {
        let samples: Vec<f64> = (0..32).map(|j| (block * 32 + j) as f64).collect();
        hop.set_signal(0, 0, 0, &samples);
        framer.process(&hop);
        if framer.output().trig() {
            frames.push(framer.output().signal(0, 0, 0).to_vec());
        }
    }
    assert!(!frames.is_empty());

    for (i, frame) in frames.iter().enumerate() {
        for (j, &sample) in frame.iter().enumerate() {
            let padded_index = i * hop_size + j;
            let expected = if padded_index < padding {
                0.0
            } else {
                (padded_index - padding) as f64
            };
            assert_eq!(sample, expected, "frame {} sample {}", i, j);
        }
    }
}

fn framing_model(frame_size: usize, hop_size: usize) -> Model {
    let mut model = Model::dynamic("FramedRms", 1500.0);
    model
        .push(
            "Frames",
            Box::new(FrameGenerator::new(FrameGeneratorConfig {
                frame_size,
                hop_size,
                start_at_window_centre: false,
            })),
        )
        .unwrap();
    let window = WindowConfig {
        shape: WindowShape::Hann { periodic: true },
        lengths: vec![frame_size],
        normalisation: Normalisation::Energy,
        align_output: true,
    };
    model.push("Windowed", Box::new(Window::new(window))).unwrap();
    model
}

/// A downstream module only runs on hops where the framer fires, and the
/// model aggregates exactly one frame per firing.
#[test]
fn test_aggregation_counts_framer_triggers() {
    init_logging();
    let mut model = framing_model(128, 64);
    model.aggregate_output("Windowed").unwrap();

    let mut hop = hop_bank(32, 48000.0);
    model.initialize(&hop).unwrap();
    assert_abs_diff_eq!(model.rate(), 1500.0);

    let signal = noise(32 * 40, 3);
    let mut triggers = 0usize;
    for part in signal.chunks(32) {
        hop.set_signal(0, 0, 0, part);
        model.process(&hop);
        if model.get_output("Windowed").unwrap().trig() {
            triggers += 1;
        }
    }

    let windowed = model.get_output("Windowed").unwrap();
    assert!(triggers > 0);
    assert_eq!(windowed.num_aggregated_frames(), triggers);
    assert_eq!(windowed.aggregated_signals().len(), triggers * 128);
}

/// After `reset()` a model replays a stream bit-exactly; no state leaks
/// from the abandoned run.
#[test]
fn test_reset_replays_identically() {
    init_logging();
    let mut model = framing_model(128, 64);
    model.aggregate_output("Windowed").unwrap();

    let mut hop = hop_bank(32, 48000.0);
    model.initialize(&hop).unwrap();

    let signal = noise(32 * 24, 4);
    let mut run = |model: &mut Model, hop: &mut SignalBank| -> Vec<f64> {
        for part in signal.chunks(32) {
            hop.set_signal(0, 0, 0, part);
            model.process(hop);
        }
        model
            .get_output("Windowed")
            .unwrap()
            .aggregated_signals()
            .to_vec()
    };

    let first = run(&mut model, &mut hop);
    model.reset();
    let second = run(&mut model, &mut hop);
    assert_eq!(first, second);
}

/// Two identically configured models given the same stream agree exactly.
#[test]
fn test_identical_models_are_deterministic() {
    init_logging();
    let signal = noise(32 * 24, 5);

    let outputs: Vec<Vec<f64>> = (0..2)
        .map(|_| {
            let mut model = framing_model(256, 32);
            model.aggregate_output("Windowed").unwrap();
            let mut hop = hop_bank(32, 48000.0);
            model.initialize(&hop).unwrap();
            for part in signal.chunks(32) {
                hop.set_signal(0, 0, 0, part);
                model.process(&hop);
            }
            model
                .get_output("Windowed")
                .unwrap()
                .aggregated_signals()
                .to_vec()
        })
        .collect();

    assert_eq!(outputs[0], outputs[1]);
}

/// A failed initialize leaves the model unusable rather than half-built.
#[test]
fn test_failed_initialize_leaves_model_uninitialized() {
    init_logging();
    let mut model = Model::dynamic("Bad", 1500.0);
    model
        .push(
            "Frames",
            Box::new(FrameGenerator::new(FrameGeneratorConfig {
                frame_size: 64,
                hop_size: 128, // hop larger than the frame
                start_at_window_centre: false,
            })),
        )
        .unwrap();

    let hop = hop_bank(32, 48000.0);
    assert!(model.initialize(&hop).is_err());
    assert!(!model.is_initialized());
}
