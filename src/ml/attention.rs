// ============================================================
// Layer 5 — Attention Kernel
// ============================================================
// Hand-rolled softmax and scaled dot-product attention over
// dense 2-D matrices. No parameters, no state.
//
//   scores  = Q · Kᵀ                       [rows(Q), rows(K)]
//   weights = softmax(scores) / √d          (default placement)
//   output  = weights · V                   [rows(Q), cols(V)]
//
// The default divides by √d AFTER normalising, so rows of the
// weight matrix sum to 1/√d rather than 1. Existing outputs depend
// on that placement; BeforeSoftmax gives the textbook variant.
//
// softmax subtracts each row's maximum before exponentiating.
// The result is mathematically identical and stays finite for
// large scores.
//
// Reference: Vaswani et al. (2017) Attention Is All You Need

use burn::prelude::*;

use crate::error::{ensure_precondition, EngineError};

/// Where the 1/√d factor is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalePlacement {
    #[default]
    AfterSoftmax,
    BeforeSoftmax,
}

/// Row-wise softmax along the last axis.
pub fn softmax<B: Backend>(matrix: Tensor<B, 2>) -> Tensor<B, 2> {
    let row_max = matrix.clone().max_dim(1);
    let exp     = (matrix - row_max).exp();
    let row_sum = exp.clone().sum_dim(1);
    exp / row_sum
}

/// Attention with the default (post-softmax) scaling.
pub fn attention<B: Backend>(
    query: Tensor<B, 2>,
    key:   Tensor<B, 2>,
    value: Tensor<B, 2>,
) -> Result<Tensor<B, 2>, EngineError> {
    attention_with(query, key, value, ScalePlacement::AfterSoftmax)
}

pub fn attention_with<B: Backend>(
    query:     Tensor<B, 2>,
    key:       Tensor<B, 2>,
    value:     Tensor<B, 2>,
    placement: ScalePlacement,
) -> Result<Tensor<B, 2>, EngineError> {
    let [_, d_q]      = query.dims();
    let [k_rows, d_k] = key.dims();
    let [v_rows, _]   = value.dims();

    ensure_precondition!(
        d_q == d_k,
        "query and key must share the contraction dimension ({} vs {})", d_q, d_k,
    );
    ensure_precondition!(
        k_rows == v_rows,
        "key and value must have the same number of rows ({} vs {})", k_rows, v_rows,
    );
    ensure_precondition!(d_k > 0, "contraction dimension must be non-zero");

    let scale  = (d_k as f64).sqrt();
    let scores = query.matmul(key.transpose());
    let weights = match placement {
        ScalePlacement::AfterSoftmax  => softmax(scores).div_scalar(scale),
        ScalePlacement::BeforeSoftmax => softmax(scores.div_scalar(scale)),
    };
    Ok(weights.matmul(value))
}

/// Rank-checked entry point for matrices whose rank is only known at runtime.
pub fn attention_from_data<B: Backend>(
    query:  TensorData,
    key:    TensorData,
    value:  TensorData,
    device: &B::Device,
) -> Result<TensorData, EngineError> {
    let q = matrix_from_data::<B>("query", query, device)?;
    let k = matrix_from_data::<B>("key", key, device)?;
    let v = matrix_from_data::<B>("value", value, device)?;
    Ok(attention(q, k, v)?.into_data())
}

/// softmax for runtime-ranked input; rejects anything that is not 2-D.
pub fn softmax_from_data<B: Backend>(
    matrix: TensorData,
    device: &B::Device,
) -> Result<TensorData, EngineError> {
    Ok(softmax(matrix_from_data::<B>("input", matrix, device)?).into_data())
}

fn matrix_from_data<B: Backend>(
    name:   &str,
    data:   TensorData,
    device: &B::Device,
) -> Result<Tensor<B, 2>, EngineError> {
    ensure_precondition!(
        data.shape.len() == 2,
        "{} matrix must be 2-dimensional, got rank {}", name, data.shape.len(),
    );
    Ok(Tensor::from_data(data, device))
}
