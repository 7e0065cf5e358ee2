use burn::module::Param;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// 切断正規分布の打ち切り幅（標準偏差の倍数）
const TRUNCATION: f64 = 2.0;

/// 平均 0、標準偏差 `std` で ±2σ に切断した正規乱数。範囲外は引き直します。
pub fn truncated_normal<R: Rng + ?Sized>(rng: &mut R, std: f64) -> f64 {
    loop {
        let z: f64 = StandardNormal.sample(&mut *rng);
        if z.abs() <= TRUNCATION {
            return z * std;
        }
    }
}

/// Xavier 型の分散スケーリング `sqrt(2 / (m + n))` で [m, n] の重みを生成します。
pub fn xavier_weights<R: Rng + ?Sized>(fan_in: usize, fan_out: usize, rng: &mut R) -> Vec<f64> {
    let std = (2.0 / (fan_in + fan_out) as f64).sqrt();
    (0..fan_in * fan_out)
        .map(|_| truncated_normal(rng, std))
        .collect()
}

/// 重みを切断正規分布、バイアスをゼロで初期化した全結合層を作ります。
pub fn init_linear<B: Backend, R: Rng + ?Sized>(
    fan_in: usize,
    fan_out: usize,
    rng: &mut R,
    device: &B::Device,
) -> Linear<B> {
    let mut linear = LinearConfig::new(fan_in, fan_out)
        .with_initializer(Initializer::Zeros)
        .init(device);
    let data = TensorData::new(xavier_weights(fan_in, fan_out, rng), [fan_in, fan_out])
        .convert::<B::FloatElem>();
    linear.weight = Param::from_tensor(Tensor::from_data(data, device));
    linear
}
