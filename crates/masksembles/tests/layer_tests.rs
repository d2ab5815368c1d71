use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use masksembles::{
    expected_size, MaskGenerator, MaskMatrix, MaskSet, MaskSnapshot, Masksembles1D,
    Masksembles1DDynamicSize, Masksembles2D, Masksembles2DDynamicSize, MasksemblesConfig,
    MasksemblesLayer, SizePolicy, Variant,
};

fn ramp(shape: &[usize], device: &Device) -> Result<Tensor> {
    let total: usize = shape.iter().product();
    let data = (0..total)
        .map(|i| (i as f32) * 0.5 - 3.0)
        .collect::<Vec<_>>();
    Ok(Tensor::from_vec(data, shape.to_vec(), device)?)
}

/// Hands out a fixed matrix regardless of the request.
struct Canned(MaskMatrix);

impl MaskGenerator for Canned {
    fn generate(
        &mut self,
        _channels: usize,
        _n: usize,
        _scale: f64,
        _sizing: SizePolicy,
    ) -> masksembles::Result<MaskMatrix> {
        Ok(self.0.clone())
    }
}

#[test]
fn every_variant_preserves_shape_and_dtype() -> Result<()> {
    let device = Device::Cpu;
    let config = MasksemblesConfig::new(16, 4, 2.0).with_seed(17);
    let dynamic_width = expected_size(16, 4, 2.0);

    let flat = Masksembles1D::new(&config, &device)?;
    let spatial = Masksembles2D::new(&config, &device)?;
    let flat_dyn = Masksembles1DDynamicSize::new(&config, &device)?;
    let spatial_dyn = Masksembles2DDynamicSize::new(&config, &device)?;

    let cases = [
        (&flat as &dyn MasksemblesLayer, vec![8, 16]),
        (&spatial as &dyn MasksemblesLayer, vec![4, 16, 5, 5]),
        (&flat_dyn as &dyn MasksemblesLayer, vec![8, dynamic_width]),
        (&spatial_dyn as &dyn MasksemblesLayer, vec![4, dynamic_width, 3, 2]),
    ];

    for (layer, shape) in cases {
        assert_eq!(layer.mask_set().size(), shape[1]);
        for &dtype in &[DType::F32, DType::F16, DType::BF16] {
            let input = ramp(&shape, &device)?.to_dtype(dtype)?;
            let output = layer.forward(&input)?;
            assert_eq!(output.dims(), input.dims(), "{:?}", layer.variant());
            assert_eq!(output.dtype(), dtype);
        }
    }
    Ok(())
}

#[test]
fn output_is_input_or_zero_per_channel_and_group() -> Result<()> {
    let device = Device::Cpu;
    let config = MasksemblesConfig::new(12, 3, 2.0).with_seed(4);
    let layer = Masksembles2D::new(&config, &device)?;
    let masks = layer.mask_set().to_matrix()?;

    let input = ramp(&[6, 12, 2, 2], &device)?;
    let output = layer.forward(&input)?;

    let expected = input.flatten_all()?.to_vec1::<f32>()?;
    let actual = output.flatten_all()?.to_vec1::<f32>()?;
    let per_example = 12 * 4;
    for (idx, (&got, &want)) in actual.iter().zip(expected.iter()).enumerate() {
        let example = idx / per_example;
        let channel = (idx % per_example) / 4;
        let group = example / 2;
        let keep = masks.row(group)[channel];
        assert_eq!(got, if keep { want } else { 0.0 }, "flat index {idx}");
    }
    Ok(())
}

#[test]
fn identity_and_zero_laws_hold() -> Result<()> {
    let device = Device::Cpu;
    let input = ramp(&[6, 5, 3, 3], &device)?;

    let config = MasksemblesConfig::new(5, 3, 2.0);
    let ones =
        Masksembles2D::with_generator(&config, &mut Canned(MaskMatrix::ones(3, 5)), &device)?;
    let output = ones.forward(&input)?;
    assert_eq!(
        output.flatten_all()?.to_vec1::<f32>()?,
        input.flatten_all()?.to_vec1::<f32>()?
    );

    let zeros =
        Masksembles2D::with_generator(&config, &mut Canned(MaskMatrix::zeros(3, 5)), &device)?;
    let output = zeros.forward(&input)?;
    assert_eq!(output.dims(), input.dims());
    assert!(output
        .flatten_all()?
        .to_vec1::<f32>()?
        .iter()
        .all(|&v| v == 0.0));
    Ok(())
}

#[test]
fn nested_generation_yields_monotone_masks() -> Result<()> {
    let device = Device::Cpu;
    let config = MasksemblesConfig::new(32, 4, 3.0)
        .with_seed(21)
        .with_nested(true);
    let layer = Masksembles1D::new(&config, &device)?;
    let masks = layer.mask_set().to_matrix()?;
    assert!(layer.mask_set().is_nested());
    for i in 1..masks.rows() {
        let (prev, cur) = (masks.row(i - 1), masks.row(i));
        assert!(prev.iter().zip(cur).all(|(&p, &c)| !p || c), "mask {i}");
        assert!(masks.active_count(i) >= masks.active_count(i - 1));
    }
    Ok(())
}

#[test]
fn unit_scale_flat_masks_are_all_ones_for_any_width() -> Result<()> {
    let device = Device::Cpu;
    // Fewer than ten channels would be rejected by the default generator.
    let layer = Masksembles1D::new(&MasksemblesConfig::new(3, 5, 1.0), &device)?;
    assert_eq!(layer.mask_set().to_matrix()?, MaskMatrix::ones(5, 3));
    Ok(())
}

#[test]
fn construction_errors_are_configuration_errors() {
    let device = Device::Cpu;
    let bad = [
        MasksemblesConfig::new(16, 0, 2.0),
        MasksemblesConfig::new(0, 4, 2.0),
        MasksemblesConfig::new(16, 4, -1.0),
    ];
    for config in &bad {
        let err = Masksembles2D::new(config, &device).unwrap_err();
        assert!(err.is_configuration(), "{config:?}");
    }

    for n in [2, 3] {
        let half = MasksemblesConfig::new(16, n, 0.5).with_seed(0);
        assert!(Masksembles2D::new(&half, &device)
            .unwrap_err()
            .is_configuration());
        assert!(Masksembles1D::new(&half, &device)
            .unwrap_err()
            .is_configuration());
    }

    let unit = MasksemblesConfig::new(16, 4, 1.0);
    assert!(Masksembles1DDynamicSize::new(&unit, &device)
        .unwrap_err()
        .is_configuration());
    assert!(Masksembles2DDynamicSize::new(&unit, &device)
        .unwrap_err()
        .is_configuration());
}

#[test]
fn batch_must_divide_into_groups() -> Result<()> {
    let device = Device::Cpu;
    let layer = Masksembles1D::new(&MasksemblesConfig::new(16, 4, 2.0).with_seed(2), &device)?;
    let input = Tensor::ones((6, 16), DType::F32, &device)?;
    let err = layer.forward(&input).unwrap_err();
    assert!(err.is_shape());
    Ok(())
}

#[test]
fn ungenerated_layer_is_zero_independent_of_scale() -> Result<()> {
    let device = Device::Cpu;
    for &scale in &[1.5, 2.0, 5.0] {
        let config = MasksemblesConfig::new(7, 3, scale).without_generation();
        let layer = Masksembles1D::new(&config, &device)?;
        assert_eq!(layer.mask_set().to_matrix()?, MaskMatrix::zeros(3, 7));
    }
    Ok(())
}

#[test]
fn snapshot_json_restores_the_same_layer() -> Result<()> {
    let device = Device::Cpu;
    let config = MasksemblesConfig::new(20, 4, 2.5).with_seed(8);
    let layer = Masksembles2D::new(&config, &device)?;

    let json = serde_json::to_string(&layer.mask_set().snapshot()?)?;
    let snapshot: MaskSnapshot = serde_json::from_str(&json)?;
    let restored = Masksembles2D::from_mask_set(MaskSet::from_snapshot(
        &snapshot,
        SizePolicy::Fixed,
        &device,
    )?)?;

    let input = ramp(&[8, 20, 2, 2], &device)?;
    let a = layer.forward(&input)?.flatten_all()?.to_vec1::<f32>()?;
    let b = restored.forward(&input)?.flatten_all()?.to_vec1::<f32>()?;
    assert_eq!(a, b);
    assert_eq!(restored.variant(), Variant::FIXED_2D);
    Ok(())
}

#[test]
fn config_defaults_apply_when_fields_are_missing() -> Result<()> {
    let config: MasksemblesConfig =
        serde_json::from_str(r#"{ "channels": 64, "n": 4, "scale": 2.0 }"#)?;
    assert!(config.generate_masks);
    assert!(!config.nested_masks);
    assert_eq!(config.seed, None);
    assert_eq!(config, MasksemblesConfig::new(64, 4, 2.0));
    Ok(())
}
