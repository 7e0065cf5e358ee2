use crate::config::PinnConfig;
use crate::lbfgs::{Lbfgs, LbfgsConfig, Termination};
use crate::loss::loss_terms;
use crate::params;
use crate::pinn::PhysicsInformedNN;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;
use std::time::Instant;

/// 最適化の段階。準ニュートン → 一次確率的 → 完了 の順にだけ進みます。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    QuasiNewton,
    FirstOrder,
    Done,
}

/// 損失履歴の1点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossRecord {
    pub phase: Phase,
    pub step: usize,
    pub loss: f64,
}

/// 準ニュートンフェーズの結果の要約
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuasiNewtonSummary {
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
    pub loss: f64,
}

/// 学習全体の結果
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub quasi_newton: Option<QuasiNewtonSummary>,
    pub first_order_steps: usize,
    pub history: Vec<LossRecord>,
    pub final_loss: f64,
    pub lambda_1: f64,
    pub lambda_2: f64,
}

impl TrainingReport {
    /// 損失または係数が有限でなくなったかどうか
    pub fn diverged(&self) -> bool {
        !(self.final_loss.is_finite() && self.lambda_1.is_finite() && self.lambda_2.is_finite())
    }
}

/// 2段階の最適化を実行する、状態を持たない駆動役。
///
/// モデルは排他的な可変参照で受け取り、各ステップで順番に更新します。
#[derive(Clone)]
pub struct Trainer {
    lbfgs: LbfgsConfig,
    adam: AdamConfig,
    learning_rate: f64,
    residual_weight: f64,
    log_every: usize,
}

impl Trainer {
    pub fn from_config(config: &PinnConfig) -> Self {
        Self {
            lbfgs: config.lbfgs.clone(),
            adam: config.adam.clone(),
            learning_rate: config.learning_rate,
            residual_weight: config.residual_weight,
            log_every: config.log_every.max(1),
        }
    }

    /// 準ニュートンフェーズの後、`iterations > 0` なら一次フェーズを実行します。
    pub fn train<B: AutodiffBackend>(&self, model: &mut PhysicsInformedNN<B>, iterations: usize) -> TrainingReport {
        let mut history = Vec::new();
        let mut quasi_newton = None;
        let mut first_order_steps = 0;
        let mut phase = Phase::QuasiNewton;

        loop {
            phase = match phase {
                Phase::QuasiNewton => {
                    let summary = self.run_quasi_newton(model, &mut history);
                    quasi_newton = Some(summary);
                    if !summary.loss.is_finite() {
                        log::warn!("準ニュートンフェーズで損失が発散しました。一次フェーズは実行しません。");
                        Phase::Done
                    } else if iterations > 0 {
                        Phase::FirstOrder
                    } else {
                        Phase::Done
                    }
                }
                Phase::FirstOrder => {
                    first_order_steps = self.run_first_order(model, iterations, &mut history);
                    Phase::Done
                }
                Phase::Done => break,
            };
        }

        let final_loss = model.loss().total;
        let (lambda_1, lambda_2) = model.coefficients();
        TrainingReport {
            quasi_newton,
            first_order_steps,
            history,
            final_loss,
            lambda_1,
            lambda_2,
        }
    }

    /// L-BFGS で重みと係数をまとめて最小化し、終了時のパラメータをモデルに書き戻します。
    pub fn run_quasi_newton<B: AutodiffBackend>(
        &self,
        model: &mut PhysicsInformedNN<B>,
        history: &mut Vec<LossRecord>,
    ) -> QuasiNewtonSummary {
        let start = Instant::now();
        let device = model.device().clone();
        let bounds = *model.bounds();
        let weight = self.residual_weight;
        let log_every = self.log_every;
        log::info!("準ニュートンフェーズ (L-BFGS) を開始します");

        let outcome = {
            let net = &model.net;
            let batch = &model.batch;
            let objective = |theta: &[f64]| {
                let candidate = params::load(net.clone(), theta, &device);
                let total = loss_terms(&candidate, &bounds, batch, weight).total;
                let value = total.clone().into_scalar().elem::<f64>();
                let grads = GradientsParams::from_grads(total.backward(), &candidate);
                (value, params::gradient(&candidate, &grads))
            };
            let callback = |state: crate::lbfgs::IterationState| {
                history.push(LossRecord {
                    phase: Phase::QuasiNewton,
                    step: state.iteration,
                    loss: state.loss,
                });
                if state.iteration % log_every == 0 {
                    log::debug!(
                        "[L-BFGS {}] Loss: {:.6e} (評価回数 {})",
                        state.iteration,
                        state.loss,
                        state.evaluations
                    );
                }
            };
            Lbfgs::new(self.lbfgs.clone()).minimize(params::flatten(net), objective, callback)
        };

        model.net = params::load(model.net.clone(), &outcome.parameters, &device);
        let (lambda_1, lambda_2) = model.coefficients();
        log::info!(
            "準ニュートンフェーズが終了しました ({:?}): 反復 {}, 評価 {}, Loss: {:.6e}, l1: {:.5}, l2: {:.5}, 時間: {:.2?}",
            outcome.termination,
            outcome.iterations,
            outcome.evaluations,
            outcome.loss,
            lambda_1,
            lambda_2,
            start.elapsed()
        );
        if outcome.termination == Termination::LineSearchFailed {
            log::warn!("直線探索で減少方向が見つからず、準ニュートンフェーズを打ち切りました");
        }
        QuasiNewtonSummary {
            iterations: outcome.iterations,
            evaluations: outcome.evaluations,
            termination: outcome.termination,
            loss: outcome.loss,
        }
    }

    /// Adam による全バッチの一次最適化を `steps` 回行い、実行したステップ数を返します。
    pub fn run_first_order<B: AutodiffBackend>(
        &self,
        model: &mut PhysicsInformedNN<B>,
        steps: usize,
        history: &mut Vec<LossRecord>,
    ) -> usize {
        let start = Instant::now();
        let bounds = *model.bounds();
        let mut optim = self.adam.init();
        log::info!("一次フェーズ (Adam) を開始します: {} ステップ", steps);

        for step in 1..=steps {
            let total = loss_terms(&model.net, &bounds, &model.batch, self.residual_weight).total;
            if step % self.log_every == 0 {
                let loss = total.clone().into_scalar().elem::<f64>();
                let (lambda_1, lambda_2) = model.coefficients();
                history.push(LossRecord {
                    phase: Phase::FirstOrder,
                    step,
                    loss,
                });
                log::debug!(
                    "[Adam {}] Loss: {:.6e}, l1: {:.5}, l2: {:.5}, 時間: {:.2?}",
                    step,
                    loss,
                    lambda_1,
                    lambda_2,
                    start.elapsed()
                );
            }
            let grads = GradientsParams::from_grads(total.backward(), &model.net);
            model.net = optim.step(self.learning_rate, model.net.clone(), grads);
        }

        let (lambda_1, lambda_2) = model.coefficients();
        log::info!(
            "一次フェーズが終了しました: l1: {:.5}, l2: {:.5}, 時間: {:.2?}",
            lambda_1,
            lambda_2,
            start.elapsed()
        );
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Observations;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray<f64>>;

    fn model(lbfgs_iterations: usize) -> PhysicsInformedNN<TestBackend> {
        model_with(PinnConfig::new(vec![3, 8, 8, 2]), lbfgs_iterations)
    }

    fn model_with(config: PinnConfig, lbfgs_iterations: usize) -> PhysicsInformedNN<TestBackend> {
        let obs = Observations::new(
            vec![0.0, 0.5, 1.0, 0.25, 0.75],
            vec![0.0, 1.0, 0.5, 0.2, 0.9],
            vec![0.0, 0.3, 1.0, 0.6, 0.1],
            vec![1.0, 0.8, 0.6, 0.9, 0.7],
            vec![0.0, 0.1, -0.1, 0.05, 0.0],
        )
        .unwrap();
        let config = config.with_lbfgs(LbfgsConfig::new().with_max_iterations(lbfgs_iterations));
        PhysicsInformedNN::new(obs, config, &Default::default()).unwrap()
    }

    #[test]
    fn quasi_newton_history_is_non_increasing() {
        let mut model = model(30);
        let before = model.loss().total;
        let mut history = Vec::new();
        let summary = Trainer::from_config(model.config()).run_quasi_newton(&mut model, &mut history);
        assert!(summary.iterations <= 30);
        assert!(summary.loss <= before);
        let mut last = before;
        for record in &history {
            assert_eq!(record.phase, Phase::QuasiNewton);
            assert!(record.loss <= last);
            last = record.loss;
        }
        assert!((model.loss().total - summary.loss).abs() <= 1e-9 * (1.0 + summary.loss));
    }

    #[test]
    fn phases_run_in_order() {
        let mut model = model(5);
        let report = model.train(20);
        let summary = report.quasi_newton.expect("quasi-newton summary");
        assert!(summary.iterations <= 5);
        assert_eq!(report.first_order_steps, 20);
        let first_adam = report.history.iter().position(|r| r.phase == Phase::FirstOrder);
        let first_adam = first_adam.expect("first-order records");
        assert!(report.history[first_adam..].iter().all(|r| r.phase == Phase::FirstOrder));
        assert_eq!(report.history.len() - first_adam, 2);
        assert!(!report.diverged());
    }

    #[test]
    fn non_finite_loss_stops_training_and_is_reported() {
        // 残差項の重みが発散していると初期損失から非有限になる
        let config = PinnConfig::new(vec![3, 8, 8, 2]).with_residual_weight(f64::INFINITY);
        let mut model = model_with(config, 10);
        assert!(!model.loss().total.is_finite());

        let report = model.train(20);
        let summary = report.quasi_newton.expect("quasi-newton summary");
        assert_eq!(summary.termination, Termination::NonFinite);
        assert_eq!(report.first_order_steps, 0);
        assert!(report.history.iter().all(|r| r.phase != Phase::FirstOrder));
        assert!(report.diverged());
    }

    #[test]
    fn zero_iterations_skips_first_order_phase() {
        let mut model = model(3);
        let report = model.train(0);
        assert_eq!(report.first_order_steps, 0);
        assert!(report.history.iter().all(|r| r.phase == Phase::QuasiNewton));
    }
}
