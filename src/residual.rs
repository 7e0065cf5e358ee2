//! 流れ関数から速度場を再構成し、Navier-Stokes 運動方程式の残差を組み立てます。
//!
//! 速度は `u = ∂ψ/∂y`, `v = -∂ψ/∂x` と定義するため、連続の式 `u_x + v_y = 0` は
//! パラメータの値によらず恒等的に満たされます。

use crate::jet::{DerivativeOrder, Partial};
use crate::model::NavierStokesNet;
use crate::normalize::DomainBounds;
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

const PSI: usize = 0;
const PRESSURE: usize = 1;

/// 問い合わせ点での速度と圧力。各テンソルは [n, 1] です。
#[derive(Debug, Clone)]
pub struct VelocityPressure<B: Backend> {
    pub u: Tensor<B, 2>,
    pub v: Tensor<B, 2>,
    pub p: Tensor<B, 2>,
}

/// 速度・圧力と運動方程式の残差 f_u, f_v。各テンソルは [n, 1] です。
#[derive(Debug, Clone)]
pub struct FlowFields<B: Backend> {
    pub u: Tensor<B, 2>,
    pub v: Tensor<B, 2>,
    pub p: Tensor<B, 2>,
    pub f_u: Tensor<B, 2>,
    pub f_v: Tensor<B, 2>,
}

/// 物理座標での速度・圧力の微分。
#[derive(Debug, Clone)]
pub(crate) struct FlowDerivatives<B: Backend> {
    pub u: Tensor<B, 2>,
    pub v: Tensor<B, 2>,
    pub p: Tensor<B, 2>,
    pub u_t: Tensor<B, 2>,
    pub u_x: Tensor<B, 2>,
    pub u_y: Tensor<B, 2>,
    pub u_xx: Tensor<B, 2>,
    pub u_yy: Tensor<B, 2>,
    pub v_t: Tensor<B, 2>,
    pub v_x: Tensor<B, 2>,
    pub v_y: Tensor<B, 2>,
    pub v_xx: Tensor<B, 2>,
    pub v_yy: Tensor<B, 2>,
    pub p_x: Tensor<B, 2>,
    pub p_y: Tensor<B, 2>,
}

/// 速度と圧力だけを求めます（残差は計算しません）。`coords` は物理座標の [n, 3] です。
pub fn velocity_pressure<B: Backend>(
    net: &NavierStokesNet<B>,
    bounds: &DomainBounds,
    coords: Tensor<B, 2>,
) -> VelocityPressure<B> {
    let [sx, sy, _] = bounds.scale();
    let jet = net.forward_jet(bounds.normalize_tensor(coords), DerivativeOrder::First);
    let psi = jet.column(PSI);
    VelocityPressure {
        u: psi.partial(Partial::Y).mul_scalar(sy),
        v: psi.partial(Partial::X).mul_scalar(-sx),
        p: jet.column(PRESSURE).value(),
    }
}

pub(crate) fn flow_derivatives<B: Backend>(
    net: &NavierStokesNet<B>,
    bounds: &DomainBounds,
    coords: Tensor<B, 2>,
) -> FlowDerivatives<B> {
    let [sx, sy, st] = bounds.scale();
    let jet = net.forward_jet(bounds.normalize_tensor(coords), DerivativeOrder::Third);
    let psi = jet.column(PSI);
    let pressure = jet.column(PRESSURE);
    // 正規化座標での微分に軸ごとのスケールを掛けて物理座標の微分に戻す
    let d = |p: Partial, scale: f64| psi.partial(p).mul_scalar(scale);

    FlowDerivatives {
        u: d(Partial::Y, sy),
        v: d(Partial::X, -sx),
        p: pressure.value(),
        u_t: d(Partial::YT, sy * st),
        u_x: d(Partial::XY, sx * sy),
        u_y: d(Partial::YY, sy * sy),
        u_xx: d(Partial::XXY, sx * sx * sy),
        u_yy: d(Partial::YYY, sy * sy * sy),
        v_t: d(Partial::XT, -sx * st),
        v_x: d(Partial::XX, -sx * sx),
        v_y: d(Partial::XY, -sx * sy),
        v_xx: d(Partial::XXX, -sx * sx * sx),
        v_yy: d(Partial::XYY, -sx * sy * sy),
        p_x: pressure.partial(Partial::X).mul_scalar(sx),
        p_y: pressure.partial(Partial::Y).mul_scalar(sy),
    }
}

/// 速度・圧力と、未知係数 λ₁, λ₂ を含む運動方程式の残差を求めます。
///
/// ```text
/// f_u = u_t + λ₁ (u u_x + v u_y) + p_x - λ₂ (u_xx + u_yy)
/// f_v = v_t + λ₁ (u v_x + v v_y) + p_y - λ₂ (v_xx + v_yy)
/// ```
pub fn navier_stokes<B: Backend>(
    net: &NavierStokesNet<B>,
    bounds: &DomainBounds,
    coords: Tensor<B, 2>,
) -> FlowFields<B> {
    let d = flow_derivatives(net, bounds, coords);
    let lambda_1 = net.lambda_1();
    let lambda_2 = net.lambda_2();

    let advection_u = d.u.clone() * d.u_x + d.v.clone() * d.u_y;
    let advection_v = d.u.clone() * d.v_x + d.v.clone() * d.v_y;
    let f_u = d.u_t + lambda_1.clone() * advection_u + d.p_x - lambda_2.clone() * (d.u_xx + d.u_yy);
    let f_v = d.v_t + lambda_1 * advection_v + d.p_y - lambda_2 * (d.v_xx + d.v_yy);

    FlowFields {
        u: d.u,
        v: d.v,
        p: d.p,
        f_u,
        f_v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f64>;

    fn values<B: Backend>(t: Tensor<B, 2>) -> Vec<f64> {
        t.to_data().iter::<f64>().collect()
    }

    fn setup() -> (NavierStokesNet<TestBackend>, DomainBounds) {
        let device = Default::default();
        let net = NavierStokesNet::new(&[3, 12, 12, 2], 99, &device).unwrap();
        let bounds = DomainBounds::new([1.0, -2.0, 0.0], [8.0, 2.0, 20.0]).unwrap();
        (net, bounds)
    }

    fn coords(points: &[[f64; 3]]) -> Tensor<TestBackend, 2> {
        let flat = points.iter().flatten().copied().collect::<Vec<_>>();
        Tensor::from_data(TensorData::new(flat, [points.len(), 3]), &Default::default())
    }

    const POINTS: [[f64; 3]; 3] = [[1.5, -1.0, 2.0], [4.0, 0.3, 11.0], [7.2, 1.7, 19.0]];

    #[test]
    fn reconstructed_velocity_is_divergence_free() {
        let (net, bounds) = setup();
        let d = flow_derivatives(&net, &bounds, coords(&POINTS));
        for div in values(d.u_x + d.v_y) {
            assert!(div.abs() < 1e-12, "divergence {div}");
        }
    }

    #[test]
    fn first_derivatives_agree_with_reverse_mode() {
        type AD = Autodiff<TestBackend>;
        let device = Default::default();
        let net = NavierStokesNet::<AD>::new(&[3, 12, 12, 2], 99, &device).unwrap();
        let bounds = DomainBounds::new([1.0, -2.0, 0.0], [8.0, 2.0, 20.0]).unwrap();
        let flat = POINTS.iter().flatten().copied().collect::<Vec<_>>();
        let input = Tensor::<AD, 2>::from_data(TensorData::new(flat, [3, 3]), &device).require_grad();

        let output = net.forward(bounds.normalize_tensor(input.clone()));
        let psi = output.slice([0..3, 0..1]);
        let grads = psi.sum().backward();
        let psi_grad = input.grad(&grads).unwrap();
        let psi_x = values(psi_grad.clone().slice([0..3, 0..1]));
        let psi_y = values(psi_grad.slice([0..3, 1..2]));

        let fields = velocity_pressure(&net, &bounds, input.detach());
        let u = values(fields.u);
        let v = values(fields.v);
        for i in 0..3 {
            assert!((u[i] - psi_y[i]).abs() < 1e-10);
            assert!((v[i] + psi_x[i]).abs() < 1e-10);
        }
    }

    #[test]
    fn second_derivatives_agree_with_finite_differences() {
        let (net, bounds) = setup();
        let h = 1e-3;
        let d = flow_derivatives(&net, &bounds, coords(&POINTS));
        let u_xx = values(d.u_xx);
        let v_yy = values(d.v_yy);
        let u_t = values(d.u_t);
        for (i, [x, y, t]) in POINTS.iter().copied().enumerate() {
            let shifted = [
                [x - h, y, t],
                [x, y, t],
                [x + h, y, t],
                [x, y - h, t],
                [x, y + h, t],
                [x, y, t - h],
                [x, y, t + h],
            ];
            let vp = velocity_pressure(&net, &bounds, coords(&shifted));
            let u = values(vp.u);
            let v = values(vp.v);
            let fd_u_xx = (u[0] - 2.0 * u[1] + u[2]) / (h * h);
            let fd_v_yy = (v[3] - 2.0 * v[1] + v[4]) / (h * h);
            let fd_u_t = (u[6] - u[5]) / (2.0 * h);
            assert!((u_xx[i] - fd_u_xx).abs() < 1e-4 * (1.0 + fd_u_xx.abs()));
            assert!((v_yy[i] - fd_v_yy).abs() < 1e-4 * (1.0 + fd_v_yy.abs()));
            assert!((u_t[i] - fd_u_t).abs() < 1e-6 * (1.0 + fd_u_t.abs()));
        }
    }

    #[test]
    fn zero_stream_function_gives_zero_residual() {
        let (net, bounds) = setup();
        let net = net.with_constant_output(3.5);
        let fields = navier_stokes(&net, &bounds, coords(&POINTS));
        for value in values(fields.f_u).into_iter().chain(values(fields.f_v)) {
            assert_eq!(value, 0.0);
        }
        for p in values(fields.p) {
            assert!((p - 3.5).abs() < 1e-12);
        }
    }
}
