use crate::data::interleave_coords;
use crate::error::Result;
use crate::loss::float_tensor;
use crate::pinn::PhysicsInformedNN;
use crate::residual::{navier_stokes, velocity_pressure};
use burn::module::AutodiffModule;
use burn::tensor::Tensor;
use burn::tensor::backend::{AutodiffBackend, Backend};

/// 問い合わせ点での予測 (u, v, p)
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub u: Vec<f64>,
    pub v: Vec<f64>,
    pub p: Vec<f64>,
}

/// 予測に運動方程式の残差 f_u, f_v を加えたもの
#[derive(Debug, Clone, PartialEq)]
pub struct FlowEvaluation {
    pub u: Vec<f64>,
    pub v: Vec<f64>,
    pub p: Vec<f64>,
    pub f_u: Vec<f64>,
    pub f_v: Vec<f64>,
}

impl<B: AutodiffBackend> PhysicsInformedNN<B> {
    /// 現在のパラメータで速度と圧力を予測します。
    ///
    /// 勾配を記録しない内部バックエンドで計算するため、モデルの状態は変わりません。
    /// 学習前に呼んだ場合は初期化直後のモデルの値を返します。
    pub fn predict(&self, x: &[f64], y: &[f64], t: &[f64]) -> Result<Prediction> {
        let coords = self.query_coords(x, y, t)?;
        let fields = velocity_pressure(&self.net.valid(), self.bounds(), coords);
        Ok(Prediction {
            u: to_vec(fields.u),
            v: to_vec(fields.v),
            p: to_vec(fields.p),
        })
    }

    /// 速度・圧力に加えて、運動方程式の残差も評価します。
    pub fn evaluate(&self, x: &[f64], y: &[f64], t: &[f64]) -> Result<FlowEvaluation> {
        let coords = self.query_coords(x, y, t)?;
        let fields = navier_stokes(&self.net.valid(), self.bounds(), coords);
        Ok(FlowEvaluation {
            u: to_vec(fields.u),
            v: to_vec(fields.v),
            p: to_vec(fields.p),
            f_u: to_vec(fields.f_u),
            f_v: to_vec(fields.f_v),
        })
    }

    fn query_coords(&self, x: &[f64], y: &[f64], t: &[f64]) -> Result<Tensor<B::InnerBackend, 2>> {
        let coords = interleave_coords(x, y, t)?;
        Ok(float_tensor(coords, [x.len(), 3], self.device()))
    }
}

fn to_vec<B: Backend>(tensor: Tensor<B, 2>) -> Vec<f64> {
    tensor.into_data().iter::<f64>().collect()
}
