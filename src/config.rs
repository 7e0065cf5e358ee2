use crate::error::PinnError;
use crate::lbfgs::LbfgsConfig;
use burn::config::Config;
use burn::optim::AdamConfig;

/// 入力座標 (x, y, t) の次元数
pub const INPUT_WIDTH: usize = 3;
/// 出力 (流れ関数 ψ, 圧力 p) の次元数
pub const OUTPUT_WIDTH: usize = 2;

/// PINN モデルと学習の設定。
///
/// 乱数シードはここで明示的に受け渡し、プロセス全体の乱数状態には依存しません。
#[derive(Config)]
pub struct PinnConfig {
    /// 各層の幅。先頭は 3、末尾は 2 でなければなりません。
    pub layers: Vec<usize>,
    /// 重み初期化に使うシード
    #[config(default = 1234)]
    pub seed: u64,
    /// データ損失に対する物理残差損失の重み
    #[config(default = 1.0)]
    pub residual_weight: f64,
    /// 一次確率的フェーズ (Adam) の学習率
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    /// 一次フェーズで損失を記録・ログ出力する間隔
    #[config(default = 10)]
    pub log_every: usize,
    /// 準ニュートンフェーズの設定
    #[config(default = "LbfgsConfig::new()")]
    pub lbfgs: LbfgsConfig,
    /// 一次フェーズの設定
    #[config(default = "AdamConfig::new().with_epsilon(1e-8)")]
    pub adam: AdamConfig,
}

impl PinnConfig {
    /// 層構成が (3, ..., 2) の形で、すべての幅が正であることを確認します。
    pub fn validate(&self) -> crate::error::Result<()> {
        validate_layers(&self.layers)
    }
}

pub(crate) fn validate_layers(layers: &[usize]) -> crate::error::Result<()> {
    if layers.len() < 2 {
        return Err(PinnError::InvalidLayers {
            reason: format!("少なくとも2層が必要です (指定: {})", layers.len()),
        });
    }
    if layers[0] != INPUT_WIDTH {
        return Err(PinnError::InvalidLayers {
            reason: format!("入力幅は {} である必要があります (指定: {})", INPUT_WIDTH, layers[0]),
        });
    }
    let last = layers[layers.len() - 1];
    if last != OUTPUT_WIDTH {
        return Err(PinnError::InvalidLayers {
            reason: format!("出力幅は {} である必要があります (指定: {})", OUTPUT_WIDTH, last),
        });
    }
    if let Some(pos) = layers.iter().position(|&w| w == 0) {
        return Err(PinnError::InvalidLayers {
            reason: format!("{} 番目の層の幅が 0 です", pos),
        });
    }
    Ok(())
}
