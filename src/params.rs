//! モジュールの全パラメータ（重み・バイアス・係数）を1本の `f64` ベクトルとして扱います。
//!
//! 準ニュートン法はパラメータを平坦なベクトルとして更新するため、
//! `ModuleVisitor` / `ModuleMapper` で書き出しと書き戻しを行います。
//! 並び順はモジュールの走査順で、常に同じです。

use burn::module::{AutodiffModule, Module, ModuleMapper, ModuleVisitor, ParamId};
use burn::optim::GradientsParams;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Tensor, TensorData};

struct Flatten {
    values: Vec<f64>,
}

impl<B: Backend> ModuleVisitor<B> for Flatten {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.values.extend(tensor.to_data().iter::<f64>());
    }
}

struct Load<'a, B: Backend> {
    values: &'a [f64],
    offset: usize,
    device: B::Device,
}

impl<B: Backend> ModuleMapper<B> for Load<'_, B> {
    fn map_float<const D: usize>(&mut self, _id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let dims = tensor.dims();
        let count = dims.iter().product::<usize>();
        let chunk = self.values[self.offset..self.offset + count].to_vec();
        self.offset += count;
        let data = TensorData::new(chunk, dims).convert::<B::FloatElem>();
        let fresh = Tensor::from_data(data, &self.device);
        if tensor.is_require_grad() {
            fresh.require_grad()
        } else {
            fresh
        }
    }
}

struct Gradients<'a> {
    grads: &'a GradientsParams,
    values: Vec<f64>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Gradients<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, tensor: &Tensor<B, D>) {
        match self.grads.get::<B::InnerBackend, D>(id) {
            Some(grad) => self.values.extend(grad.to_data().iter::<f64>()),
            // 損失に寄与しないパラメータの勾配はゼロ
            None => self
                .values
                .extend(std::iter::repeat_n(0.0, tensor.dims().iter().product())),
        }
    }
}

/// 全パラメータを走査順に並べたベクトル
pub fn flatten<B: Backend, M: Module<B>>(module: &M) -> Vec<f64> {
    let mut visitor = Flatten {
        values: Vec::with_capacity(module.num_params()),
    };
    module.visit(&mut visitor);
    visitor.values
}

/// `flatten` と同じ並び順のベクトルをモジュールに書き戻します。
///
/// `values` の長さは `module.num_params()` と一致していなければなりません。
pub fn load<B: Backend, M: Module<B>>(module: M, values: &[f64], device: &B::Device) -> M {
    debug_assert_eq!(values.len(), module.num_params());
    let mut mapper = Load {
        values,
        offset: 0,
        device: device.clone(),
    };
    module.map(&mut mapper)
}

/// 逆伝播で得た勾配を `flatten` と同じ並び順で取り出します。
pub fn gradient<B: AutodiffBackend, M: AutodiffModule<B>>(module: &M, grads: &GradientsParams) -> Vec<f64> {
    let mut visitor = Gradients {
        grads,
        values: Vec::with_capacity(module.num_params()),
    };
    module.visit(&mut visitor);
    visitor.values
}
