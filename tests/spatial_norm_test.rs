use ndarray::{s, Array, Array1, Array4, Axis, Dimension, ShapeBuilder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tensor_layers::config::{BatchNormParam, GroupNormParam, Mode};
use tensor_layers::gradcheck::eval_numerical_gradient_array;
use tensor_layers::layers::{
    spatial_batchnorm_backward, spatial_batchnorm_forward, spatial_groupnorm_backward,
    spatial_groupnorm_forward,
};
use tensor_layers::Error;

fn uniform<D: Dimension, Sh: ShapeBuilder<Dim = D>>(shape: Sh, seed: u64) -> Array<f64, D> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array::from_shape_simple_fn(shape, || rng.random::<f64>() * 2.0 - 1.0)
}

fn assert_close<D: Dimension>(a: &Array<f64, D>, b: &Array<f64, D>, tol: f64) {
    assert_eq!(a.shape(), b.shape());
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).abs() <= tol, "{} vs {} (tol {})", x, y, tol);
    }
}

#[test]
fn spatial_batchnorm_normalizes_each_channel() {
    let _ = env_logger::try_init();
    let x = uniform((4, 3, 5, 5), 81).mapv(|v| 10.0 * v + 10.0);
    let mut param = BatchNormParam::new(Mode::Train);
    let (out, cache) =
        spatial_batchnorm_forward(&x, &Array1::ones(3), &Array1::zeros(3), &mut param).unwrap();
    assert!(cache.is_some());
    for ch in 0..3 {
        let plane = out.slice(s![.., ch, .., ..]);
        assert!(plane.mean().unwrap().abs() < 1e-8);
        let var = plane.mapv(|v| v * v).mean().unwrap();
        assert!((var - 1.0).abs() < 1e-6, "channel {} var {}", ch, var);
    }
    assert_eq!(param.running_mean.as_ref().map(|m| m.len()), Some(3));
}

#[test]
fn spatial_batchnorm_test_mode_uses_running_stats() {
    let x = uniform((2, 2, 3, 3), 82);
    let mut param = BatchNormParam::new(Mode::Test)
        .with_running_stats(Array1::from(vec![1.0, -1.0]), Array1::from(vec![4.0, 1.0]))
        .with_eps(1e-12);
    let (out, cache) =
        spatial_batchnorm_forward(&x, &Array1::ones(2), &Array1::zeros(2), &mut param).unwrap();
    assert!(cache.is_none());
    assert_close(
        &out.slice(s![.., 0, .., ..]).to_owned(),
        &x.slice(s![.., 0, .., ..]).mapv(|v| (v - 1.0) / 2.0),
        1e-9,
    );
    assert_close(
        &out.slice(s![.., 1, .., ..]).to_owned(),
        &x.slice(s![.., 1, .., ..]).mapv(|v| v + 1.0),
        1e-9,
    );
}

#[test]
fn spatial_batchnorm_gradients_match_numeric() {
    let x = uniform((2, 3, 4, 5), 83).mapv(|v| 4.0 * v + 10.0);
    let gamma = uniform(3, 84);
    let beta = uniform(3, 85);
    let dout: Array4<f64> = uniform((2, 3, 4, 5), 86);
    let forward = |x: &Array4<f64>, g: &Array1<f64>, b: &Array1<f64>| {
        let mut p = BatchNormParam::new(Mode::Train);
        spatial_batchnorm_forward(x, g, b, &mut p).unwrap().0
    };

    let mut param = BatchNormParam::new(Mode::Train);
    let (_, cache) = spatial_batchnorm_forward(&x, &gamma, &beta, &mut param).unwrap();
    let (dx, dgamma, dbeta) = spatial_batchnorm_backward(&dout, &cache.unwrap()).unwrap();
    assert_eq!(dgamma.shape(), &[3]);

    let dx_num =
        eval_numerical_gradient_array(|xv| forward(xv, &gamma, &beta), &x, &dout, 1e-5).unwrap();
    let dgamma_num =
        eval_numerical_gradient_array(|gv| forward(&x, gv, &beta), &gamma, &dout, 1e-5).unwrap();
    let dbeta_num =
        eval_numerical_gradient_array(|bv| forward(&x, &gamma, bv), &beta, &dout, 1e-5).unwrap();
    assert_close(&dx, &dx_num, 1e-6);
    assert_close(&dgamma, &dgamma_num, 1e-6);
    assert_close(&dbeta, &dbeta_num, 1e-6);
}

#[test]
fn groupnorm_with_one_channel_per_group_is_instance_norm() {
    let x = uniform((2, 4, 3, 3), 87).mapv(|v| 3.0 * v - 1.0);
    let eps = 1e-5;
    let param = GroupNormParam::new(4).with_eps(eps);
    let (out, _) =
        spatial_groupnorm_forward(&x, &Array1::ones(4), &Array1::zeros(4), &param).unwrap();

    let mut expected = Array4::<f64>::zeros(x.raw_dim());
    for img in 0..2 {
        for ch in 0..4 {
            let plane = x.slice(s![img, ch, .., ..]);
            let mean = plane.mean().unwrap();
            let var = plane.mapv(|v| (v - mean).powi(2)).mean().unwrap();
            expected
                .slice_mut(s![img, ch, .., ..])
                .assign(&plane.mapv(|v| (v - mean) / (var + eps).sqrt()));
        }
    }
    assert_close(&out, &expected, 1e-12);
}

#[test]
fn groupnorm_normalizes_each_group_block() {
    let x = uniform((2, 6, 2, 2), 88).mapv(|v| 50.0 * v);
    let param = GroupNormParam::new(2);
    let (out, _) =
        spatial_groupnorm_forward(&x, &Array1::ones(6), &Array1::zeros(6), &param).unwrap();
    let blocks = out.to_shape((4, 12)).unwrap();
    let mean = blocks.mean_axis(Axis(1)).unwrap();
    let var = blocks.var_axis(Axis(1), 0.0);
    assert_close(&mean, &Array1::zeros(4), 1e-10);
    assert_close(&var, &Array1::ones(4), 1e-6);
}

#[test]
fn groupnorm_gradients_match_numeric() {
    let x = uniform((2, 6, 3, 2), 89).mapv(|v| 2.0 * v + 3.0);
    let gamma = uniform(6, 90);
    let beta = uniform(6, 91);
    let dout: Array4<f64> = uniform((2, 6, 3, 2), 92);
    let param = GroupNormParam::new(3);
    let forward = |x: &Array4<f64>, g: &Array1<f64>, b: &Array1<f64>| {
        spatial_groupnorm_forward(x, g, b, &param).unwrap().0
    };

    let (_, cache) = spatial_groupnorm_forward(&x, &gamma, &beta, &param).unwrap();
    let (dx, dgamma, dbeta) = spatial_groupnorm_backward(&dout, &cache).unwrap();
    assert_eq!(dgamma.shape(), &[1, 6, 1, 1]);
    assert_eq!(dbeta.shape(), &[1, 6, 1, 1]);

    let dx_num =
        eval_numerical_gradient_array(|xv| forward(xv, &gamma, &beta), &x, &dout, 1e-5).unwrap();
    let dgamma_num =
        eval_numerical_gradient_array(|gv| forward(&x, gv, &beta), &gamma, &dout, 1e-5).unwrap();
    let dbeta_num =
        eval_numerical_gradient_array(|bv| forward(&x, &gamma, bv), &beta, &dout, 1e-5).unwrap();
    assert_close(&dx, &dx_num, 1e-6);
    assert_close(&dgamma.into_shape_with_order(6).unwrap(), &dgamma_num, 1e-6);
    assert_close(&dbeta.into_shape_with_order(6).unwrap(), &dbeta_num, 1e-6);
}

#[test]
fn groupnorm_rejects_bad_groups() {
    let x = Array4::<f64>::zeros((1, 6, 2, 2));
    let gamma = Array1::ones(6);
    let beta = Array1::zeros(6);
    assert!(matches!(
        spatial_groupnorm_forward(&x, &gamma, &beta, &GroupNormParam::new(4)),
        Err(Error::ShapeMismatch { .. })
    ));
    assert!(matches!(
        spatial_groupnorm_forward(&x, &gamma, &beta, &GroupNormParam::new(0)),
        Err(Error::InvalidGeometry { .. })
    ));
    assert!(matches!(
        spatial_groupnorm_forward(&x, &gamma, &beta, &GroupNormParam::new(2).with_eps(0.0)),
        Err(Error::InvalidEpsilon { .. })
    ));
    assert!(matches!(
        spatial_groupnorm_forward(&x, &Array1::ones(3), &beta, &GroupNormParam::new(2)),
        Err(Error::ShapeMismatch { .. })
    ));
}

fn column_major(a: &Array4<f64>) -> Array4<f64> {
    let f = Array4::from_shape_fn(a.raw_dim().f(), |idx| a[idx]);
    assert!(!f.is_standard_layout());
    f
}

#[test]
fn groupnorm_backward_accepts_column_major_gradient() {
    let x = uniform((2, 4, 3, 3), 93);
    let gamma = uniform(4, 94);
    let beta = uniform(4, 95);
    let param = GroupNormParam::new(2);
    let (_, cache) = spatial_groupnorm_forward(&x, &gamma, &beta, &param).unwrap();

    let dout: Array4<f64> = uniform((2, 4, 3, 3), 96);
    let (dx, dgamma, dbeta) = spatial_groupnorm_backward(&dout, &cache).unwrap();
    let (dx_f, dgamma_f, dbeta_f) =
        spatial_groupnorm_backward(&column_major(&dout), &cache).unwrap();
    assert_close(&dx_f, &dx, 1e-12);
    assert_close(&dgamma_f, &dgamma, 1e-12);
    assert_close(&dbeta_f, &dbeta, 1e-12);
}

#[test]
fn groupnorm_forward_accepts_column_major_input() {
    let x = uniform((2, 4, 3, 3), 97);
    let gamma = uniform(4, 98);
    let beta = uniform(4, 99);
    let param = GroupNormParam::new(2);
    let (out, _) = spatial_groupnorm_forward(&x, &gamma, &beta, &param).unwrap();
    let (out_f, _) = spatial_groupnorm_forward(&column_major(&x), &gamma, &beta, &param).unwrap();
    assert_close(&out_f, &out, 1e-12);
}

#[test]
fn spatial_batchnorm_accepts_column_major_arrays() {
    let x = uniform((3, 2, 4, 4), 100).mapv(|v| 2.0 * v + 1.0);
    let gamma = uniform(2, 101);
    let beta = uniform(2, 102);
    let dout: Array4<f64> = uniform((3, 2, 4, 4), 103);

    let mut param = BatchNormParam::new(Mode::Train);
    let (out, cache) = spatial_batchnorm_forward(&x, &gamma, &beta, &mut param).unwrap();
    let cache = cache.unwrap();
    let mut param_f = BatchNormParam::new(Mode::Train);
    let (out_f, cache_f) =
        spatial_batchnorm_forward(&column_major(&x), &gamma, &beta, &mut param_f).unwrap();
    assert_close(&out_f, &out, 1e-12);

    let (dx, dgamma, dbeta) = spatial_batchnorm_backward(&dout, &cache).unwrap();
    let dout_f = column_major(&dout);
    let cache_f = cache_f.unwrap();
    for c in [&cache, &cache_f] {
        let (dx_f, dgamma_f, dbeta_f) = spatial_batchnorm_backward(&dout_f, c).unwrap();
        assert_close(&dx_f, &dx, 1e-12);
        assert_close(&dgamma_f, &dgamma, 1e-12);
        assert_close(&dbeta_f, &dbeta, 1e-12);
    }
}
