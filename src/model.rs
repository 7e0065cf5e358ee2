use crate::config::validate_layers;
use crate::error::Result;
use crate::init::init_linear;
use crate::jet::{DerivativeOrder, Jet};
use burn::module::{Module, Param};
use burn::nn::{Linear, Tanh};
use burn::prelude::Backend;
use burn::tensor::{ElementConversion, Tensor};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// PINNの本体となるニューラルネットワークと、未知の物理係数 λ₁, λ₂。
///
/// 正規化済みの座標 (x, y, t) を入力とし、流れ関数 ψ と圧力 p を出力する多層パーセプトロン（MLP）です。
/// 係数はネットワークの重みと同じパラメータ集合として一緒に最適化されます。
#[derive(Module, Debug)]
pub struct NavierStokesNet<B: Backend> {
    linears: Vec<Linear<B>>,
    activation: Tanh,
    lambda_1: Param<Tensor<B, 1>>,
    lambda_2: Param<Tensor<B, 1>>,
}

impl<B: Backend> NavierStokesNet<B> {
    /// 層構成 `layers` に従ってモデルを初期化します。
    ///
    /// 重みは切断正規分布（分散スケーリング）、バイアスと係数はゼロで初期化され、
    /// 同じ `seed` からは常に同じモデルが得られます。
    pub fn new(layers: &[usize], seed: u64, device: &B::Device) -> Result<Self> {
        validate_layers(layers)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let linears = layers
            .windows(2)
            .map(|pair| init_linear(pair[0], pair[1], &mut rng, device))
            .collect();
        Ok(Self {
            linears,
            activation: Tanh::new(),
            lambda_1: Param::from_tensor(Tensor::zeros([1], device)),
            lambda_2: Param::from_tensor(Tensor::zeros([1], device)),
        })
    }

    /// モデルの順伝播を実行します。入力は正規化済みの [n, 3]、出力は [n, 2] (ψ, p) です。
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = input;
        let last = self.linears.len() - 1;
        for linear in &self.linears[..last] {
            x = linear.forward(x);
            x = self.activation.forward(x);
        }
        self.linears[last].forward(x)
    }

    /// 入力座標に関する微分を伴った順伝播。隠れ層の活性化は tanh です。
    pub fn forward_jet(&self, input: Tensor<B, 2>, order: DerivativeOrder) -> Jet<B> {
        let mut jet = Jet::seed(input, order);
        let last = self.linears.len() - 1;
        for linear in &self.linears[..last] {
            jet = jet.affine(linear).tanh();
        }
        jet.affine(&self.linears[last])
    }

    /// 係数 λ₁ を [1, 1] のテンソルとして返します。
    pub fn lambda_1(&self) -> Tensor<B, 2> {
        self.lambda_1.val().reshape([1, 1])
    }

    /// 係数 λ₂ を [1, 1] のテンソルとして返します。
    pub fn lambda_2(&self) -> Tensor<B, 2> {
        self.lambda_2.val().reshape([1, 1])
    }

    /// 現在の係数 (λ₁, λ₂) の値
    pub fn coefficients(&self) -> (f64, f64) {
        let read = |p: &Param<Tensor<B, 1>>| p.val().into_scalar().elem::<f64>();
        (read(&self.lambda_1), read(&self.lambda_2))
    }

    /// 各層の重み行列の形状 (入力幅, 出力幅)
    pub fn weight_shapes(&self) -> Vec<[usize; 2]> {
        self.linears.iter().map(|l| l.weight.val().dims()).collect()
    }

    /// テスト用に、出力層を「ψ = 0、p = 定数」に置き換えます。
    #[cfg(test)]
    pub(crate) fn with_constant_output(mut self, pressure: f64) -> Self {
        use burn::tensor::TensorData;
        let last = self.linears.len() - 1;
        let [fan_in, fan_out] = self.linears[last].weight.val().dims();
        let device = self.linears[last].weight.val().device();
        self.linears[last].weight = Param::from_tensor(Tensor::zeros([fan_in, fan_out], &device));
        let bias = TensorData::new(vec![0.0, pressure], [2]).convert::<B::FloatElem>();
        self.linears[last].bias = Some(Param::from_tensor(Tensor::from_data(bias, &device)));
        self
    }
}
