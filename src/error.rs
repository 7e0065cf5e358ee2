use thiserror::Error;

/// このクレート全体で使う結果型。
pub type Result<T> = std::result::Result<T, PinnError>;

/// 構築時・予測時の入力検証で発生するエラー。
///
/// 学習中の発散（損失が非有限になること）はエラーとして扱わず、
/// `TrainingReport` にそのまま伝播します。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PinnError {
    /// 観測列の長さが揃っていない
    #[error("列 '{column}' の長さが不正です: 期待値 {expected}, 実際 {found}")]
    ColumnLengthMismatch {
        column: &'static str,
        expected: usize,
        found: usize,
    },

    /// 観測点が1つもない
    #[error("観測データが空です")]
    EmptyObservations,

    /// 層構成が入力幅3・出力幅2の制約を満たさない
    #[error("層構成が不正です: {reason}")]
    InvalidLayers { reason: String },

    /// ある座標軸の範囲がゼロ（正規化でゼロ除算になる）
    #[error("座標軸 '{axis}' の範囲が縮退しています: [{lower}, {upper}]")]
    DegenerateDomain {
        axis: &'static str,
        lower: f64,
        upper: f64,
    },

    /// 入力に NaN や無限大が含まれる
    #[error("列 '{column}' の {index} 番目の値が有限ではありません")]
    NonFiniteValue { column: &'static str, index: usize },
}
