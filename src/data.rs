use crate::error::{PinnError, Result};
use rand::Rng;
use rand::seq::index;
use rand_distr::{Distribution, StandardNormal};

/// 観測データ (x, y, t, u, v) の固定長の集合。
///
/// 構築後は変更されません。部分抽出やノイズ付加は新しい集合を返します。
#[derive(Debug, Clone, PartialEq)]
pub struct Observations {
    x: Vec<f64>,
    y: Vec<f64>,
    t: Vec<f64>,
    u: Vec<f64>,
    v: Vec<f64>,
}

impl Observations {
    /// 5本の観測列から集合を作ります。列の長さが揃っていない場合や、
    /// 非有限値を含む場合はエラーを返します。
    pub fn new(x: Vec<f64>, y: Vec<f64>, t: Vec<f64>, u: Vec<f64>, v: Vec<f64>) -> Result<Self> {
        let n = x.len();
        if n == 0 {
            return Err(PinnError::EmptyObservations);
        }
        for (column, values) in [("x", &x), ("y", &y), ("t", &t), ("u", &u), ("v", &v)] {
            check_column(column, values, n)?;
        }
        Ok(Self { x, y, t, u, v })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn t(&self) -> &[f64] {
        &self.t
    }

    pub fn u(&self) -> &[f64] {
        &self.u
    }

    pub fn v(&self) -> &[f64] {
        &self.v
    }

    /// 座標 (x, y, t) を行優先の [n, 3] 配列に並べます。
    pub fn coords(&self) -> Vec<f64> {
        let mut coords = Vec::with_capacity(self.len() * 3);
        for i in 0..self.len() {
            coords.extend([self.x[i], self.y[i], self.t[i]]);
        }
        coords
    }

    /// 重複なしで `n` 点をランダムに抽出します。`n` が全体数以上なら複製を返します。
    ///
    /// 空の集合は作れないため、`n == 0` はエラーです。
    pub fn subsample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Result<Self> {
        if n == 0 {
            return Err(PinnError::EmptyObservations);
        }
        if n >= self.len() {
            return Ok(self.clone());
        }
        let picked = index::sample(rng, self.len(), n);
        let take = |column: &[f64]| picked.iter().map(|i| column[i]).collect::<Vec<_>>();
        Ok(Self {
            x: take(&self.x),
            y: take(&self.y),
            t: take(&self.t),
            u: take(&self.u),
            v: take(&self.v),
        })
    }

    /// 速度列 u, v にガウスノイズ `level * std(列) * N(0, 1)` を加えた集合を返します。
    pub fn with_noise<R: Rng + ?Sized>(&self, level: f64, rng: &mut R) -> Self {
        let corrupt = |column: &[f64], rng: &mut R| {
            let scale = level * std_dev(column);
            column
                .iter()
                .map(|&value| {
                    let z: f64 = StandardNormal.sample(&mut *rng);
                    value + scale * z
                })
                .collect::<Vec<_>>()
        };
        let u = corrupt(&self.u, rng);
        let v = corrupt(&self.v, rng);
        Self {
            x: self.x.clone(),
            y: self.y.clone(),
            t: self.t.clone(),
            u,
            v,
        }
    }
}

/// 座標3列 (x, y, t) を検証し、行優先の [n, 3] 配列に並べます。
pub(crate) fn interleave_coords(x: &[f64], y: &[f64], t: &[f64]) -> Result<Vec<f64>> {
    let n = x.len();
    for (column, values) in [("x", x), ("y", y), ("t", t)] {
        check_column(column, values, n)?;
    }
    let mut coords = Vec::with_capacity(n * 3);
    for i in 0..n {
        coords.extend([x[i], y[i], t[i]]);
    }
    Ok(coords)
}

fn check_column(column: &'static str, values: &[f64], expected: usize) -> Result<()> {
    if values.len() != expected {
        return Err(PinnError::ColumnLengthMismatch {
            column,
            expected,
            found: values.len(),
        });
    }
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(PinnError::NonFiniteValue { column, index });
    }
    Ok(())
}

fn std_dev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}
