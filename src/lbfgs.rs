//! 強 Wolfe 条件の直線探索を伴う記憶制限 BFGS (L-BFGS) 法。
//!
//! パラメータを `f64` の平坦なベクトルとして扱い、目的関数は値と勾配を同時に返す
//! クロージャで与えます。

use burn::config::Config;
use std::collections::VecDeque;

/// L-BFGS の設定。既定値は反復・評価回数ともに 50000、修正ペア 50 組、
/// 直線探索 50 ステップ、相対改善量の許容値は機械イプシロンです。
#[derive(Config, Debug)]
pub struct LbfgsConfig {
    /// 最大反復回数
    #[config(default = 50000)]
    pub max_iterations: usize,
    /// 目的関数の最大評価回数
    #[config(default = 50000)]
    pub max_evaluations: usize,
    /// 保持する修正ペア (s, y) の数
    #[config(default = 50)]
    pub history_size: usize,
    /// 1回の直線探索で許す最大評価回数
    #[config(default = 50)]
    pub max_line_search_steps: usize,
    /// `(f_k - f_{k+1}) / max(|f_k|, |f_{k+1}|, 1)` がこれ以下になったら収束とみなします。
    #[config(default = "f64::EPSILON")]
    pub function_tolerance: f64,
    /// 勾配の最大絶対値がこれ以下になったら収束とみなします。
    #[config(default = 1e-5)]
    pub gradient_tolerance: f64,
}

/// 最適化が止まった理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// 目的関数の相対改善量が許容値以下になった
    FunctionTolerance,
    /// 勾配が許容値以下になった
    GradientTolerance,
    /// 最大反復回数に達した
    MaxIterations,
    /// 最大評価回数に達した
    MaxEvaluations,
    /// 直線探索で減少方向が見つからなかった
    LineSearchFailed,
    /// 目的関数が有限でなくなった
    NonFinite,
}

impl Termination {
    /// 許容値による正常な収束かどうか
    pub fn converged(self) -> bool {
        matches!(self, Termination::FunctionTolerance | Termination::GradientTolerance)
    }
}

/// 最適化の結果
#[derive(Debug, Clone)]
pub struct LbfgsOutcome {
    pub parameters: Vec<f64>,
    pub loss: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
}

/// 各反復の終了時にコールバックへ渡す情報
#[derive(Debug, Clone, Copy)]
pub struct IterationState {
    pub iteration: usize,
    pub evaluations: usize,
    pub loss: f64,
}

/// 強 Wolfe 条件の定数 (十分減少条件 c1, 曲率条件 c2)
const C1: f64 = 1e-4;
const C2: f64 = 0.9;
/// 探索区間がこれより狭くなったら直線探索を打ち切ります。
const STEP_TOLERANCE: f64 = 1e-9;

struct Correction {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

struct Probe {
    step: f64,
    loss: f64,
    grad: Vec<f64>,
    slope: f64,
}

#[derive(Debug, Clone)]
pub struct Lbfgs {
    config: LbfgsConfig,
}

impl Lbfgs {
    pub fn new(config: LbfgsConfig) -> Self {
        Self { config }
    }

    /// `x0` から目的関数を最小化します。
    ///
    /// `objective` は点 `x` での (値, 勾配) を返し、`callback` は各反復の後に呼ばれます。
    /// 受理されたステップは強 Wolfe 条件の十分減少条件を満たすため、損失は反復ごとに増えません。
    pub fn minimize<F, C>(&self, x0: Vec<f64>, mut objective: F, mut callback: C) -> LbfgsOutcome
    where
        F: FnMut(&[f64]) -> (f64, Vec<f64>),
        C: FnMut(IterationState),
    {
        let cfg = &self.config;
        let mut x = x0;
        let (mut loss, mut grad) = objective(&x);
        let mut evaluations = 1;
        let mut history: VecDeque<Correction> = VecDeque::with_capacity(cfg.history_size);

        let finish = |parameters, loss, iterations, evaluations, termination| LbfgsOutcome {
            parameters,
            loss,
            iterations,
            evaluations,
            termination,
        };

        if !loss.is_finite() || grad.iter().any(|g| !g.is_finite()) {
            return finish(x, loss, 0, evaluations, Termination::NonFinite);
        }
        if max_abs(&grad) <= cfg.gradient_tolerance {
            return finish(x, loss, 0, evaluations, Termination::GradientTolerance);
        }

        for iteration in 1..=cfg.max_iterations {
            let mut direction = two_loop(&grad, &history);
            let mut slope = dot(&grad, &direction);
            if slope > -f64::EPSILON * dot(&grad, &grad) {
                // 曲率情報が壊れている場合は最急降下方向からやり直す
                history.clear();
                direction = grad.iter().map(|g| -g).collect();
                slope = -dot(&grad, &grad);
            }

            let initial_step = if iteration == 1 {
                (1.0 / grad.iter().map(|g| g.abs()).sum::<f64>()).min(1.0)
            } else {
                1.0
            };
            let budget = cfg
                .max_line_search_steps
                .min(cfg.max_evaluations.saturating_sub(evaluations))
                .max(1);
            let (probe, used) = strong_wolfe(&mut objective, &x, &direction, loss, slope, initial_step, budget);
            evaluations += used;

            if !probe.loss.is_finite() {
                x.iter_mut().zip(&direction).for_each(|(xi, di)| *xi += probe.step * di);
                return finish(x, probe.loss, iteration, evaluations, Termination::NonFinite);
            }
            if probe.loss > loss || probe.step == 0.0 {
                let termination = if evaluations >= cfg.max_evaluations {
                    Termination::MaxEvaluations
                } else {
                    Termination::LineSearchFailed
                };
                return finish(x, loss, iteration, evaluations, termination);
            }

            let s: Vec<f64> = direction.iter().map(|d| probe.step * d).collect();
            let y: Vec<f64> = probe.grad.iter().zip(&grad).map(|(a, b)| a - b).collect();
            let ys = dot(&y, &s);
            if ys > 1e-10 {
                if history.len() == cfg.history_size {
                    history.pop_front();
                }
                if cfg.history_size > 0 {
                    history.push_back(Correction { s: s.clone(), y, rho: 1.0 / ys });
                }
            }

            x.iter_mut().zip(&s).for_each(|(xi, si)| *xi += si);
            let previous = loss;
            loss = probe.loss;
            grad = probe.grad;
            callback(IterationState {
                iteration,
                evaluations,
                loss,
            });

            let relative = (previous - loss) / previous.abs().max(loss.abs()).max(1.0);
            if relative <= cfg.function_tolerance {
                return finish(x, loss, iteration, evaluations, Termination::FunctionTolerance);
            }
            if max_abs(&grad) <= cfg.gradient_tolerance {
                return finish(x, loss, iteration, evaluations, Termination::GradientTolerance);
            }
            if evaluations >= cfg.max_evaluations {
                return finish(x, loss, iteration, evaluations, Termination::MaxEvaluations);
            }
        }
        finish(x, loss, cfg.max_iterations, evaluations, Termination::MaxIterations)
    }
}

/// 二重ループ再帰で `-H g` を求めます。初期ヘッセ近似は直近ペアの `s·y / y·y` 倍の単位行列です。
fn two_loop(grad: &[f64], history: &VecDeque<Correction>) -> Vec<f64> {
    let mut q: Vec<f64> = grad.iter().map(|g| -g).collect();
    let mut alphas = Vec::with_capacity(history.len());
    for c in history.iter().rev() {
        let alpha = c.rho * dot(&c.s, &q);
        axpy(-alpha, &c.y, &mut q);
        alphas.push(alpha);
    }
    if let Some(last) = history.back() {
        let gamma = dot(&last.s, &last.y) / dot(&last.y, &last.y);
        q.iter_mut().for_each(|v| *v *= gamma);
    }
    for (c, alpha) in history.iter().zip(alphas.iter().rev()) {
        let beta = c.rho * dot(&c.y, &q);
        axpy(alpha - beta, &c.s, &mut q);
    }
    q
}

/// 強 Wolfe 条件を満たすステップ幅を探します（区間の拡大と三次補間による絞り込み）。
///
/// 戻り値は見つかった点と、使った評価回数です。
fn strong_wolfe<F>(
    objective: &mut F,
    x: &[f64],
    direction: &[f64],
    loss: f64,
    slope: f64,
    initial_step: f64,
    max_steps: usize,
) -> (Probe, usize)
where
    F: FnMut(&[f64]) -> (f64, Vec<f64>),
{
    let d_norm = max_abs(direction);
    let mut evaluate = |step: f64| {
        let point: Vec<f64> = x.iter().zip(direction).map(|(xi, di)| xi + step * di).collect();
        let (loss, grad) = objective(&point);
        let slope = dot(&grad, direction);
        Probe {
            step,
            loss,
            grad,
            slope,
        }
    };

    let origin = Probe {
        step: 0.0,
        loss,
        grad: Vec::new(),
        slope,
    };
    let mut current = evaluate(initial_step);
    let mut used = 1;
    let mut previous = origin;

    // 区間の拡大。`low` には十分減少条件を満たす側の端点が入ります。
    let (mut low, mut high) = loop {
        // 非有限値は十分減少条件を満たさない点として扱い、区間を縮めて回避する
        if !current.loss.is_finite()
            || current.loss > loss + C1 * current.step * slope
            || (used > 1 && current.loss >= previous.loss)
        {
            break (previous, current);
        }
        if current.slope.abs() <= -C2 * slope {
            return (current, used);
        }
        if current.slope >= 0.0 {
            break (current, previous);
        }
        if used >= max_steps {
            return (current, used);
        }
        let min_step = current.step + 0.01 * (current.step - previous.step);
        let max_step = current.step * 10.0;
        let next = cubic_interpolate(&previous, &current, Some((min_step, max_step)));
        previous = current;
        current = evaluate(next);
        used += 1;
    };

    // 区間の絞り込み。`low` は十分減少条件を満たす点のうち損失が最小の点で、
    // `low` での傾きは `high` へ向かって負です。
    let mut insufficient_progress = false;
    while used < max_steps {
        if (high.step - low.step).abs() * d_norm < STEP_TOLERANCE {
            break;
        }
        let (lo, hi) = (low.step.min(high.step), low.step.max(high.step));
        let mut step = cubic_interpolate(&low, &high, None);
        let margin = 0.1 * (hi - lo);
        if (hi - step).min(step - lo) < margin {
            if insufficient_progress || step >= hi || step <= lo {
                step = if (step - hi).abs() < (step - lo).abs() {
                    hi - margin
                } else {
                    lo + margin
                };
                insufficient_progress = false;
            } else {
                insufficient_progress = true;
            }
        } else {
            insufficient_progress = false;
        }

        let probe = evaluate(step);
        used += 1;
        if !probe.loss.is_finite() || probe.loss > loss + C1 * probe.step * slope || probe.loss >= low.loss {
            high = probe;
        } else {
            if probe.slope.abs() <= -C2 * slope {
                return (probe, used);
            }
            if probe.slope * (high.step - low.step) >= 0.0 {
                high = std::mem::replace(&mut low, probe);
            } else {
                low = probe;
            }
        }
    }

    if low.step == 0.0 {
        // 原点より良い点が見つからなかった
        return (
            Probe {
                step: 0.0,
                loss,
                grad: Vec::new(),
                slope,
            },
            used,
        );
    }
    (low, used)
}

/// 2点の値と傾きから三次補間の極小点を求め、区間に収めます。
fn cubic_interpolate(a: &Probe, b: &Probe, bounds: Option<(f64, f64)>) -> f64 {
    let (lo, hi) = bounds.unwrap_or((a.step.min(b.step), a.step.max(b.step)));
    let d1 = a.slope + b.slope - 3.0 * (a.loss - b.loss) / (a.step - b.step);
    let d2_square = d1 * d1 - a.slope * b.slope;
    if d2_square >= 0.0 {
        let d2 = d2_square.sqrt();
        let min_pos = if a.step <= b.step {
            b.step - (b.step - a.step) * ((b.slope + d2 - d1) / (b.slope - a.slope + 2.0 * d2))
        } else {
            a.step - (a.step - b.step) * ((a.slope + d2 - d1) / (a.slope - b.slope + 2.0 * d2))
        };
        if min_pos.is_finite() {
            return min_pos.max(lo).min(hi);
        }
    }
    (lo + hi) / 2.0
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    y.iter_mut().zip(x).for_each(|(yi, xi)| *yi += alpha * xi);
}

fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |m, x| m.max(x.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rosenbrock(x: &[f64]) -> (f64, Vec<f64>) {
        let (a, b) = (x[0], x[1]);
        let f = (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2);
        let g = vec![-2.0 * (1.0 - a) - 400.0 * a * (b - a * a), 200.0 * (b - a * a)];
        (f, g)
    }

    #[test]
    fn minimizes_rosenbrock() {
        let lbfgs = Lbfgs::new(LbfgsConfig::new().with_gradient_tolerance(1e-8));
        let outcome = lbfgs.minimize(vec![-1.2, 1.0], rosenbrock, |_| {});
        assert!(outcome.termination.converged(), "{:?}", outcome.termination);
        assert!((outcome.parameters[0] - 1.0).abs() < 1e-3);
        assert!((outcome.parameters[1] - 1.0).abs() < 1e-3);
        assert!(outcome.loss < 1e-6);
    }

    #[test]
    fn accepted_steps_never_increase_loss() {
        let lbfgs = Lbfgs::new(LbfgsConfig::new());
        let mut losses = vec![rosenbrock(&[-1.2, 1.0]).0];
        lbfgs.minimize(vec![-1.2, 1.0], rosenbrock, |state| losses.push(state.loss));
        assert!(losses.len() > 2);
        for pair in losses.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
    }

    #[test]
    fn quadratic_converges_quickly() {
        let scales = [1.0, 10.0, 100.0, 0.5];
        let quadratic = |x: &[f64]| {
            let f = x.iter().zip(&scales).map(|(xi, s)| s * (xi - 2.0).powi(2)).sum::<f64>();
            let g = x.iter().zip(&scales).map(|(xi, s)| 2.0 * s * (xi - 2.0)).collect();
            (f, g)
        };
        let outcome = Lbfgs::new(LbfgsConfig::new()).minimize(vec![0.0; 4], quadratic, |_| {});
        assert!(outcome.termination.converged());
        assert!(outcome.iterations < 50);
        for xi in outcome.parameters {
            assert!((xi - 2.0).abs() < 1e-5);
        }
    }

    #[test]
    fn respects_iteration_budget() {
        let config = LbfgsConfig::new().with_max_iterations(3);
        let outcome = Lbfgs::new(config).minimize(vec![-1.2, 1.0], rosenbrock, |_| {});
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.termination, Termination::MaxIterations);
    }

    #[test]
    fn respects_evaluation_budget() {
        let config = LbfgsConfig::new().with_max_evaluations(10);
        let line_search_steps = config.max_line_search_steps;
        let outcome = Lbfgs::new(config).minimize(vec![-1.2, 1.0], rosenbrock, |_| {});
        assert_eq!(outcome.termination, Termination::MaxEvaluations);
        assert!(outcome.evaluations >= 10);
        assert!(outcome.evaluations <= 10 + line_search_steps);
    }

    #[test]
    fn line_search_steps_bound_evaluations_per_iteration() {
        let config = LbfgsConfig::new().with_max_iterations(20).with_max_line_search_steps(2);
        let outcome = Lbfgs::new(config).minimize(vec![-1.2, 1.0], rosenbrock, |_| {});
        // 初期評価 1 回と、反復ごとに高々 2 回
        assert!(outcome.evaluations <= 1 + 2 * outcome.iterations);
    }

    // f(x) = x^2 を x = 1 から -1 方向に探索する。ステップ 1.9999 は損失を下げるが十分減少条件は満たさない。
    fn parabola(x: &[f64]) -> (f64, Vec<f64>) {
        (x[0] * x[0], vec![2.0 * x[0]])
    }

    #[test]
    fn line_search_returns_sufficient_decrease_point() {
        let mut objective = parabola;
        let (probe, used) = strong_wolfe(&mut objective, &[1.0], &[-1.0], 1.0, -2.0, 1.9999, 50);
        assert!(used >= 2);
        assert!(probe.loss <= 1.0 + C1 * probe.step * -2.0);
        assert!((probe.step - 1.0).abs() < 1e-6);
    }

    #[test]
    fn exhausted_line_search_never_returns_insufficient_step() {
        let mut objective = parabola;
        let (probe, used) = strong_wolfe(&mut objective, &[1.0], &[-1.0], 1.0, -2.0, 1.9999, 1);
        assert_eq!(used, 1);
        assert_eq!(probe.step, 0.0);
        assert_eq!(probe.loss, 1.0);
    }

    #[test]
    fn reports_non_finite_start() {
        let outcome = Lbfgs::new(LbfgsConfig::new()).minimize(vec![0.0], |_| (f64::NAN, vec![0.0]), |_| {});
        assert_eq!(outcome.termination, Termination::NonFinite);
        assert_eq!(outcome.iterations, 0);
    }
}
