use std::fs;
use std::path::PathBuf;

use ferrite_n2n::summary::{read_events, Event};
use ferrite_n2n::{
    Batch, DenoisingModel, EvalPass, GlobalStep, Mode, ModelConfig, ModelOutput, N2nError, Tensor,
};

fn small_config(architecture: &str, loss: &str) -> ModelConfig {
    let mut config = ModelConfig {
        architecture: architecture.into(),
        loss: loss.into(),
        learning_rate: 1e-2,
        seed: Some(42),
        ..ModelConfig::default()
    };
    config.unet.base_filters = 4;
    config.rednet.layers = 3;
    config.rednet.filters = 4;
    config
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ferrite-n2n-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn pattern(b: usize, h: usize, w: usize, c: usize, phase: f64) -> Tensor {
    Tensor::from_shape_fn((b, h, w, c), |(n, y, x, k)| {
        0.5 + 0.4 * ((y * 3 + x * 5 + k + n) as f64 * 0.7 + phase).sin()
    })
}

fn noisy_batch(b: usize) -> Batch {
    Batch::new(pattern(b, 8, 8, 1, 0.0))
        .with_target(pattern(b, 8, 8, 1, 0.3))
        .with_gt(pattern(b, 8, 8, 1, 0.15))
}

#[test]
fn predict_preserves_shape_and_ignores_missing_labels() {
    for arch in ["unet", "rednet"] {
        let mut model = DenoisingModel::new(&small_config(arch, "l2"), 3).unwrap();
        let input = pattern(2, 7, 9, 3, 0.0);
        let out = model.run(&Batch::new(input.clone()), Mode::Predict).unwrap();
        let denoised = out.into_denoised().unwrap();
        assert_eq!(denoised.dim(), input.dim(), "{arch}");
    }
}

#[test]
fn fresh_model_on_constant_batch_has_near_zero_losses() {
    for arch in ["unet", "rednet"] {
        for loss in ["l0", "l1", "l2"] {
            let mut model = DenoisingModel::new(&small_config(arch, loss), 1).unwrap();
            let half = Tensor::from_elem((2, 8, 8, 1), 0.5);
            let batch = Batch::new(half.clone()).with_target(half.clone()).with_gt(half);

            let step = GlobalStep::default();
            let mut pass = EvalPass::new();
            let out = model.run(&batch, Mode::Eval { step: &step, pass: &mut pass }).unwrap();
            let ModelOutput::Eval { loss: l, comparison_metric } = out else { panic!("expected eval output") };
            assert!(l < 1e-12, "{arch}/{loss}: {l}");
            assert!(comparison_metric < 1e-12, "{arch}/{loss}: {comparison_metric}");
        }
    }
}

#[test]
fn eval_metric_is_running_mean_over_the_pass() {
    let mut model = DenoisingModel::new(&small_config("rednet", "l1"), 1).unwrap();
    let step = GlobalStep::default();
    let first = noisy_batch(2);
    let second = Batch::new(pattern(2, 8, 8, 1, 1.0))
        .with_target(pattern(2, 8, 8, 1, 1.2))
        .with_gt(pattern(2, 8, 8, 1, 2.0));

    // Each batch alone, in its own pass.
    let single = |batch: &Batch, model: &mut DenoisingModel| {
        let mut pass = EvalPass::new();
        match model.run(batch, Mode::Eval { step: &step, pass: &mut pass }).unwrap() {
            ModelOutput::Eval { comparison_metric, .. } => comparison_metric,
            other => panic!("unexpected {other:?}"),
        }
    };
    let a = single(&first, &mut model);
    let b = single(&second, &mut model);
    assert!((a - b).abs() > 1e-6);

    let mut pass = EvalPass::new();
    model.run(&first, Mode::Eval { step: &step, pass: &mut pass }).unwrap();
    let out = model.run(&second, Mode::Eval { step: &step, pass: &mut pass }).unwrap();
    let ModelOutput::Eval { comparison_metric, .. } = out else { panic!("expected eval output") };
    assert!((comparison_metric - (a + b) / 2.0).abs() < 1e-12);
}

#[test]
fn train_advances_step_by_one_and_changes_parameters() {
    let mut model = DenoisingModel::new(&small_config("unet", "l2"), 1).unwrap();
    let before: Vec<_> = model.parameters().iter().map(|p| p.value.to_owned()).collect();
    let batch = noisy_batch(2);

    let mut step = GlobalStep::default();
    let first = model.run(&batch, Mode::Train { step: &mut step }).unwrap();
    assert!(matches!(first, ModelOutput::Train { global_step: 1, .. }));
    let second = model.run(&batch, Mode::Train { step: &mut step }).unwrap();
    assert!(matches!(second, ModelOutput::Train { global_step: 2, .. }));
    assert_eq!(step.get(), 2);

    let changed = model
        .parameters()
        .iter()
        .zip(before.iter())
        .any(|(p, old)| p.value.iter().zip(old.iter()).any(|(a, b)| a != b));
    assert!(changed);
}

#[test]
fn non_finite_loss_leaves_step_and_parameters_untouched() {
    let mut model = DenoisingModel::new(&small_config("unet", "l2"), 1).unwrap();
    let snapshot = |model: &DenoisingModel| -> Vec<_> { model.parameters().iter().map(|p| p.value.to_owned()).collect() };
    let before = snapshot(&model);

    let mut input = pattern(2, 8, 8, 1, 0.0);
    input[[1, 4, 4, 0]] = f64::NAN;
    let poisoned = Batch::new(input).with_target(pattern(2, 8, 8, 1, 0.3));

    let mut step = GlobalStep::new(3);
    let err = model.run(&poisoned, Mode::Train { step: &mut step }).unwrap_err();
    assert!(matches!(err, N2nError::NumericInstability(_)), "{err}");
    assert_eq!(step.get(), 3);
    assert_eq!(snapshot(&model), before);
}

#[test]
fn train_commits_batch_norm_statistics() {
    let mut model = DenoisingModel::new(&small_config("unet", "l2"), 1).unwrap();
    let moving_mean = |model: &DenoisingModel| {
        model
            .parameters()
            .iter()
            .find(|p| p.name == "unet/enc0/conv1/bn/moving_mean")
            .map(|p| p.value.to_owned())
            .unwrap()
    };
    let before = moving_mean(&model);

    // A rejected step must not leak its batch statistics into the next one.
    let mut input = pattern(2, 8, 8, 1, 0.0);
    input[[0, 0, 0, 0]] = f64::NAN;
    let poisoned = Batch::new(input).with_target(pattern(2, 8, 8, 1, 0.3));
    let mut step = GlobalStep::default();
    assert!(model.run(&poisoned, Mode::Train { step: &mut step }).is_err());
    assert_eq!(moving_mean(&model), before);

    model.run(&noisy_batch(2), Mode::Train { step: &mut step }).unwrap();
    let after = moving_mean(&model);
    assert_eq!(step.get(), 1);
    assert!(after.iter().all(|v| v.is_finite()));
    assert_ne!(after, before);
}

#[test]
fn training_reduces_loss_on_a_fixed_batch() {
    let mut model = DenoisingModel::new(&small_config("rednet", "l2"), 1).unwrap();
    let batch = Batch::new(pattern(2, 8, 8, 1, 0.0)).with_target(pattern(2, 8, 8, 1, 0.5));
    let mut step = GlobalStep::default();

    let first = model.run(&batch, Mode::Train { step: &mut step }).unwrap().loss().unwrap();
    let mut last = first;
    for _ in 0..30 {
        last = model.run(&batch, Mode::Train { step: &mut step }).unwrap().loss().unwrap();
    }
    assert!(last < first, "{last} >= {first}");
}

#[test]
fn missing_labels_are_invalid_input_and_leave_the_step_alone() {
    let mut model = DenoisingModel::new(&small_config("unet", "l1"), 1).unwrap();
    let input_only = Batch::new(pattern(1, 8, 8, 1, 0.0));

    let mut step = GlobalStep::new(5);
    let err = model.run(&input_only, Mode::Train { step: &mut step }).unwrap_err();
    assert!(matches!(err, N2nError::InvalidInput(ref m) if m.contains("target")));
    assert_eq!(step.get(), 5);

    let no_gt = input_only.clone().with_target(pattern(1, 8, 8, 1, 0.1));
    let mut pass = EvalPass::new();
    let err = model.run(&no_gt, Mode::Eval { step: &step, pass: &mut pass }).unwrap_err();
    assert!(matches!(err, N2nError::InvalidInput(ref m) if m.contains("gt")));
    assert_eq!(pass.batches(), 0);
}

#[test]
fn wrong_channel_count_is_invalid_input() {
    let mut model = DenoisingModel::new(&small_config("rednet", "l2"), 1).unwrap();
    let err = model.run(&Batch::new(pattern(1, 8, 8, 3, 0.0)), Mode::Predict).unwrap_err();
    assert!(matches!(err, N2nError::InvalidInput(_)));
}

#[test]
fn unknown_names_fail_at_construction() {
    for (arch, loss, activation) in [("resnet", "l2", "identity"), ("unet", "l3", "identity"), ("unet", "l2", "softmax")] {
        let config = ModelConfig { output_activation: activation.into(), ..small_config(arch, loss) };
        let err = DenoisingModel::new(&config, 1).err().unwrap();
        assert!(matches!(err, N2nError::InvalidConfiguration(_)), "{arch}/{loss}/{activation}");
    }
    let config = ModelConfig { learning_rate: 0.0, ..small_config("unet", "l2") };
    assert!(matches!(DenoisingModel::new(&config, 1), Err(N2nError::InvalidConfiguration(_))));
}

#[test]
fn l0_eval_loss_saturates_after_annealing() {
    let mut model = DenoisingModel::new(&small_config("rednet", "l0"), 1).unwrap();
    let batch = noisy_batch(1);
    let late = GlobalStep::new(250_000);
    let mut pass = EvalPass::new();
    let out = model.run(&batch, Mode::Eval { step: &late, pass: &mut pass }).unwrap();
    assert_eq!(out.loss(), Some(1.0));
}

#[test]
fn checkpoint_round_trip_reproduces_predictions() {
    let dir = temp_dir("ckpt");
    let path = dir.join("checkpoint.json");
    let batch = noisy_batch(2);

    let mut trained = DenoisingModel::new(&small_config("unet", "l2"), 1).unwrap();
    let mut step = GlobalStep::default();
    for _ in 0..3 {
        trained.run(&batch, Mode::Train { step: &mut step }).unwrap();
    }
    trained.save_checkpoint(&path, step).unwrap();

    let config = ModelConfig { seed: Some(7), ..small_config("unet", "l2") };
    let mut restored = DenoisingModel::new(&config, 1).unwrap();
    assert_eq!(restored.load_checkpoint(&path).unwrap(), step);

    let a = trained.run(&batch, Mode::Predict).unwrap().into_denoised().unwrap();
    let b = restored.run(&batch, Mode::Predict).unwrap().into_denoised().unwrap();
    assert!(a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-12));
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn model_dir_collects_events_and_panels() {
    let dir = temp_dir("run");
    let config = ModelConfig {
        model_dir: Some(dir.clone()),
        variable_histograms: true,
        gradient_histograms: true,
        ..small_config("rednet", "l0")
    };
    let mut model = DenoisingModel::new(&config, 1).unwrap();
    let batch = noisy_batch(2);

    let mut step = GlobalStep::default();
    model.run(&batch, Mode::Train { step: &mut step }).unwrap();
    let mut pass = EvalPass::new();
    model.run(&batch, Mode::Eval { step: &step, pass: &mut pass }).unwrap();
    model.run(&batch, Mode::Eval { step: &step, pass: &mut pass }).unwrap();
    model.flush_summaries();

    let events = read_events(dir.join("events.jsonl")).unwrap();
    let tags: Vec<&str> = events
        .iter()
        .map(|e| match e {
            Event::Scalar { tag, .. } | Event::Histogram { tag, .. } | Event::Image { tag, .. } => tag.as_str(),
        })
        .collect();
    assert!(tags.contains(&"loss"));
    assert!(tags.contains(&"l0/gamma"));
    assert!(tags.iter().any(|t| t.starts_with("variables/rednet/")));
    assert!(tags.iter().any(|t| t.starts_with("gradients/rednet/")));
    // Panels only for the first batch of the pass.
    assert_eq!(tags.iter().filter(|t| **t == "eval/panel").count(), 1);
    assert!(dir.join("eval").join("step_00000001_panel.png").exists());
    assert!(dir.join("eval").join("step_00000001_panel_crop.png").exists());
    let _ = fs::remove_dir_all(dir);
}
