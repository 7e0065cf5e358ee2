//! # Navier-Stokes 方程式の物理情報ニューラルネットワーク (PINN) ライブラリ
//!
//! `burn` フレームワークを使用して、まばらでノイズを含む速度観測 (u, v) から、
//! 速度場・圧力と運動方程式の未知係数 λ₁, λ₂ を同時に推定します。
//!
//! ネットワークは座標 (x, y, t) から流れ関数 ψ と圧力 p を出力し、速度は
//! `u = ψ_y`, `v = -ψ_x` として再構成されるため、非圧縮条件は常に満たされます。
//! 損失はデータ適合項と運動方程式の残差項の和で、L-BFGS と Adam の2段階で最小化します。
//!
//! ```no_run
//! use ns_pinn::{Observations, PinnConfig, PhysicsInformedNN, TrainBackend};
//!
//! # fn main() -> ns_pinn::Result<()> {
//! let observations = Observations::new(
//!     vec![0.0, 1.0], vec![0.0, 1.0], vec![0.0, 1.0], vec![1.0, 0.5], vec![0.0, 0.1],
//! )?;
//! let config = PinnConfig::new(vec![3, 20, 20, 20, 2]);
//! let mut model = PhysicsInformedNN::<TrainBackend>::new(observations, config, &Default::default())?;
//! let report = model.train(1000);
//! println!("l1 = {}, l2 = {}", report.lambda_1, report.lambda_2);
//! let prediction = model.predict(&[0.5], &[0.5], &[0.5])?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod inference;
pub mod init;
pub mod jet;
pub mod lbfgs;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod params;
pub mod pinn;
pub mod residual;
pub mod training;

pub use config::PinnConfig;
pub use data::Observations;
pub use error::{PinnError, Result};
pub use inference::{FlowEvaluation, Prediction};
pub use lbfgs::LbfgsConfig;
pub use normalize::DomainBounds;
pub use pinn::PhysicsInformedNN;
pub use training::{Trainer, TrainingReport};

/// 学習に使う既定のバックエンド (CPU, 単精度)
pub type TrainBackend = burn::backend::Autodiff<burn::backend::NdArray<f32>>;
