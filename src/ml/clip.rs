// ============================================================
// Layer 5 — Global Gradient Clipping
// ============================================================
// Burn's built-in GradientClipping works tensor by tensor. Here
// the threshold bounds the L2 norm of ALL gradients taken as one
// vector:
//
//   norm  = sqrt( Σ_params Σ_i g_i² )
//   scale = clip / (norm + 1e-6)   if that is < 1, else 1
//
// Plain SGD is linear in the gradient, so the uniform rescale is
// folded into the step size:  θ -= (lr · scale) · g.

use burn::{
    module::{Module, ModuleVisitor, Param},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

const EPS: f64 = 1e-6;

struct GradNormVisitor<'a, B: AutodiffBackend> {
    grads:  &'a B::Gradients,
    sum_sq: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradNormVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        if let Some(grad) = param.val().grad(self.grads) {
            self.sum_sq += grad.powi_scalar(2).sum().into_scalar().elem::<f64>();
        }
    }
}

/// L2 norm of every parameter gradient of `module`, concatenated.
pub fn global_grad_norm<B, M>(module: &M, grads: &B::Gradients) -> f64
where
    B: AutodiffBackend,
    M: Module<B>,
{
    let mut visitor = GradNormVisitor::<B> { grads, sum_sq: 0.0 };
    module.visit(&mut visitor);
    visitor.sum_sq.sqrt()
}

/// Factor that brings `norm` down to at most `max_norm`; 1.0 when already within.
pub fn clip_scale(norm: f64, max_norm: f64) -> f64 {
    let scale = max_norm / (norm + EPS);
    if scale < 1.0 { scale } else { 1.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::{Linear, LinearConfig};

    type B = Autodiff<NdArray>;

    #[test]
    fn test_clip_scale_bounds_norm() {
        for (norm, max) in [(10.0, 0.25), (3.0, 1.0), (1e4, 5.0)] {
            let clipped = norm * clip_scale(norm, max);
            assert!(clipped <= max + 1e-6, "{norm} -> {clipped}");
        }
    }

    #[test]
    fn test_clip_scale_leaves_small_gradients() {
        assert_eq!(clip_scale(0.1, 0.25), 1.0);
        assert_eq!(clip_scale(0.0, 0.25), 1.0);
    }

    #[test]
    fn test_global_norm_spans_all_parameters() {
        let device = Default::default();
        let linear: Linear<B> = LinearConfig::new(2, 1).init(&device);
        let x = Tensor::<B, 2>::from_floats([[3.0, 4.0]], &device);

        // d(sum(xW + b))/dW = xᵀ, d/db = 1  →  norm = sqrt(9 + 16 + 1)
        let grads = linear.forward(x).sum().backward();
        let norm = global_grad_norm(&linear, &grads);
        assert!((norm - 26f64.sqrt()).abs() < 1e-5, "norm = {norm}");
    }
}
