//! 入力座標に関する前進モード微分（テイラー展開の伝播）。
//!
//! 速度は流れ関数 ψ の一階微分なので、運動方程式の粘性項には ψ の三階微分が必要になります。
//! 入力次元は 3 と小さいため、必要な偏微分だけを各層で連鎖律により伝播させます。
//! すべて通常のテンソル演算なので、最終的な損失はパラメータについて逆伝播できます。

use burn::nn::Linear;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

const X: usize = 0;
const Y: usize = 1;
const T: usize = 2;

/// 追跡する偏微分。添字は正規化座標の軸 (x, y, t) を表します。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partial {
    X,
    Y,
    T,
    XX,
    XY,
    YY,
    XT,
    YT,
    XXX,
    XXY,
    XYY,
    YYY,
}

/// 伝播させる微分の最高階数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivativeOrder {
    /// 速度の再構成に必要な一階微分まで
    First,
    /// 運動方程式の残差に必要な三階微分まで
    Third,
}

impl DerivativeOrder {
    fn partial_count(self) -> usize {
        match self {
            DerivativeOrder::First => 3,
            DerivativeOrder::Third => 12,
        }
    }
}

/// ある層の出力値と、その入力座標に関する偏微分の組。
///
/// `partials[p as usize]` が偏微分 `p` に対応し、形状はすべて `value` と同じ [n, width] です。
#[derive(Debug, Clone)]
pub struct Jet<B: Backend> {
    value: Tensor<B, 2>,
    partials: Vec<Tensor<B, 2>>,
}

impl<B: Backend> Jet<B> {
    /// 正規化済みの入力 [n, 3] から、恒等写像の微分を種として jet を作ります。
    pub fn seed(input: Tensor<B, 2>, order: DerivativeOrder) -> Self {
        let [n, width] = input.dims();
        let device = input.device();
        let mut partials = Vec::with_capacity(order.partial_count());
        for axis in [X, Y, T] {
            partials.push(unit_direction::<B>(n, width, axis, &device));
        }
        for _ in 3..order.partial_count() {
            partials.push(Tensor::zeros([n, width], &device));
        }
        Self {
            value: input,
            partials,
        }
    }

    pub fn value(&self) -> Tensor<B, 2> {
        self.value.clone()
    }

    /// 偏微分を取り出します。一階の jet に対して二階以上を要求するとパニックします。
    pub fn partial(&self, partial: Partial) -> Tensor<B, 2> {
        self.partials[partial as usize].clone()
    }

    /// 全結合層 `z = a W + b` を適用します。微分にはバイアスが寄与しません。
    pub fn affine(self, linear: &Linear<B>) -> Self {
        let weight = linear.weight.val();
        let partials = self
            .partials
            .into_iter()
            .map(|d| d.matmul(weight.clone()))
            .collect();
        Self {
            value: linear.forward(self.value),
            partials,
        }
    }

    /// 要素ごとの tanh を適用し、Faà di Bruno の公式で微分を更新します。
    pub fn tanh(self) -> Self {
        let s = self.value.tanh();
        let s2 = s.clone() * s.clone();
        // tanh の 1〜3 階導関数
        let d1 = s2.clone().neg().add_scalar(1.0);
        let d2 = (s.clone() * d1.clone()).mul_scalar(-2.0);
        let d3 = (d1.clone() * (d1.clone() - s2.mul_scalar(2.0))).mul_scalar(-2.0);

        let z = |p: Partial| self.partials[p as usize].clone();
        let first = |i: Partial| d1.clone() * z(i);
        let second = |i: Partial, j: Partial, ij: Partial| d2.clone() * z(i) * z(j) + d1.clone() * z(ij);

        let mut partials = vec![first(Partial::X), first(Partial::Y), first(Partial::T)];
        if self.partials.len() > 3 {
            partials.push(second(Partial::X, Partial::X, Partial::XX));
            partials.push(second(Partial::X, Partial::Y, Partial::XY));
            partials.push(second(Partial::Y, Partial::Y, Partial::YY));
            partials.push(second(Partial::X, Partial::T, Partial::XT));
            partials.push(second(Partial::Y, Partial::T, Partial::YT));

            let (zx, zy) = (z(Partial::X), z(Partial::Y));
            let (zxx, zxy, zyy) = (z(Partial::XX), z(Partial::XY), z(Partial::YY));
            // a_xxx = σ''' z_x^3 + 3 σ'' z_xx z_x + σ' z_xxx
            partials.push(
                d3.clone() * zx.clone() * zx.clone() * zx.clone()
                    + (d2.clone() * zxx.clone() * zx.clone()).mul_scalar(3.0)
                    + d1.clone() * z(Partial::XXX),
            );
            // a_xxy = σ''' z_x^2 z_y + σ'' (z_xx z_y + 2 z_xy z_x) + σ' z_xxy
            partials.push(
                d3.clone() * zx.clone() * zx.clone() * zy.clone()
                    + d2.clone() * (zxx * zy.clone() + (zxy.clone() * zx.clone()).mul_scalar(2.0))
                    + d1.clone() * z(Partial::XXY),
            );
            // a_xyy = σ''' z_x z_y^2 + σ'' (2 z_xy z_y + z_yy z_x) + σ' z_xyy
            partials.push(
                d3.clone() * zx.clone() * zy.clone() * zy.clone()
                    + d2.clone() * ((zxy * zy.clone()).mul_scalar(2.0) + zyy.clone() * zx)
                    + d1.clone() * z(Partial::XYY),
            );
            // a_yyy = σ''' z_y^3 + 3 σ'' z_yy z_y + σ' z_yyy
            partials.push(
                d3 * zy.clone() * zy.clone() * zy.clone()
                    + (d2 * zyy * zy).mul_scalar(3.0)
                    + d1 * z(Partial::YYY),
            );
        }
        Self { value: s, partials }
    }

    /// 出力の1列だけを取り出した jet を返します。
    pub fn column(&self, index: usize) -> Self {
        let n = self.value.dims()[0];
        let pick = |t: &Tensor<B, 2>| t.clone().slice([0..n, index..index + 1]);
        Self {
            value: pick(&self.value),
            partials: self.partials.iter().map(pick).collect(),
        }
    }
}

/// 第 `axis` 列だけが 1 の [n, width] テンソル
fn unit_direction<B: Backend>(n: usize, width: usize, axis: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut data = vec![0.0f64; n * width];
    for row in 0..n {
        data[row * width + axis] = 1.0;
    }
    Tensor::from_data(TensorData::new(data, [n, width]).convert::<B::FloatElem>(), device)
}
