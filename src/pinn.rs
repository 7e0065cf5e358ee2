use crate::config::PinnConfig;
use crate::data::Observations;
use crate::error::Result;
use crate::loss::{LossValues, TrainingBatch, loss_terms};
use crate::model::NavierStokesNet;
use crate::normalize::DomainBounds;
use crate::training::{Trainer, TrainingReport};
use burn::tensor::backend::AutodiffBackend;
use std::fmt;

/// 観測データから速度場・圧力と未知係数 λ₁, λ₂ を推定する PINN。
///
/// モデル（ネットワークと係数）、領域の範囲、デバイス上の学習データを保持します。
/// 学習の手順そのものは [`Trainer`] が担い、このモデルを可変参照で受け取って更新します。
pub struct PhysicsInformedNN<B: AutodiffBackend> {
    pub(crate) net: NavierStokesNet<B>,
    bounds: DomainBounds,
    observations: Observations,
    pub(crate) batch: TrainingBatch<B>,
    config: PinnConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> fmt::Debug for PhysicsInformedNN<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicsInformedNN")
            .field("layers", &self.config.layers)
            .field("bounds", &self.bounds)
            .field("observations", &self.observations.len())
            .field("coefficients", &self.coefficients())
            .finish()
    }
}

impl<B: AutodiffBackend> PhysicsInformedNN<B> {
    /// 観測データの座標範囲から正規化の範囲を求めてモデルを構築します。学習はまだ行いません。
    pub fn new(observations: Observations, config: PinnConfig, device: &B::Device) -> Result<Self> {
        let bounds = DomainBounds::from_observations(&observations)?;
        Self::with_bounds(observations, bounds, config, device)
    }

    /// 正規化の範囲を呼び出し側が指定してモデルを構築します。
    ///
    /// 観測点が1点しかないなど、データだけでは範囲が縮退する場合に使います。
    pub fn with_bounds(
        observations: Observations,
        bounds: DomainBounds,
        config: PinnConfig,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;
        let net = NavierStokesNet::new(&config.layers, config.seed, device)?;
        let batch = TrainingBatch::from_observations(&observations, device);
        log::info!(
            "PINN を構築しました: 層構成 {:?}, 観測点 {} 個, パラメータ数 {}",
            config.layers,
            observations.len(),
            burn::module::Module::num_params(&net)
        );
        Ok(Self {
            net,
            bounds,
            observations,
            batch,
            config,
            device: device.clone(),
        })
    }

    /// 準ニュートンフェーズを予算いっぱいまで実行し、続けて一次フェーズを `iterations` 回実行します。
    ///
    /// 損失が発散した場合もエラーにはせず、非有限の損失を含むレポートを返します。
    pub fn train(&mut self, iterations: usize) -> TrainingReport {
        Trainer::from_config(&self.config).train(self, iterations)
    }

    /// 現在のパラメータでの損失の内訳
    pub fn loss(&self) -> LossValues {
        loss_terms(&self.net, &self.bounds, &self.batch, self.config.residual_weight).values()
    }

    /// 現在の係数 (λ₁, λ₂)
    pub fn coefficients(&self) -> (f64, f64) {
        self.net.coefficients()
    }

    pub fn net(&self) -> &NavierStokesNet<B> {
        &self.net
    }

    pub fn bounds(&self) -> &DomainBounds {
        &self.bounds
    }

    pub fn observations(&self) -> &Observations {
        &self.observations
    }

    pub fn config(&self) -> &PinnConfig {
        &self.config
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}
