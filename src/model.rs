//! A small causal transformer used as the scoring oracle.
//!
//! The layers are deliberately simple ndarray math; what matters for the
//! decoding loop is the interface: causal masking, explicit position and
//! token-type embeddings, and a per-layer key/value cache so incremental
//! decoding only ever scores the newly fed tokens.

use ndarray::{s, Array1, Array2, Axis};
use rand::Rng;

use crate::decoder::{Oracle, Step};
use crate::error::{InferenceError, Result};

/// Configuration for the transformer model.
#[derive(Clone, Debug)]
pub struct ModelArgs {
    /// Maximum sequence length supported.
    pub max_seq_len: usize,
    /// Vocabulary size.
    pub vocab_size: usize,
    /// Embedding/hidden dimension.
    pub dim: usize,
    /// Number of layers.
    pub n_layers: usize,
    /// Number of attention heads.
    pub n_heads: usize,
    /// Hidden dimension of the feed-forward network.
    pub hidden_dim: usize,
}

impl Default for ModelArgs {
    fn default() -> Self {
        Self {
            max_seq_len: 128,
            vocab_size: 1024,
            dim: 64,
            n_layers: 2,
            n_heads: 4,
            hidden_dim: 256,
        }
    }
}

impl ModelArgs {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Cached keys and values for one layer, one row per consumed position.
#[derive(Debug)]
pub struct LayerPast {
    k: Array2<f32>,
    v: Array2<f32>,
}

impl LayerPast {
    fn len(&self) -> usize {
        self.k.nrows()
    }
}

/// Carried state over the prefix consumed so far.
///
/// Returned fresh from every forward pass; the previous value is consumed by
/// the call, so two steps can never alias the same cache.
#[derive(Debug)]
pub struct Past {
    layers: Vec<LayerPast>,
}

impl Past {
    /// Number of positions covered by the cache.
    pub fn len(&self) -> usize {
        self.layers.first().map_or(0, LayerPast::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Embedding layer mapping ids to vectors.
pub struct Embedding {
    weight: Array2<f32>, // entries x dim
}

impl Embedding {
    pub fn new(entries: usize, dim: usize) -> Self {
        let mut rng = rand::thread_rng();
        let weight = Array2::from_shape_fn((entries, dim), |_| rng.gen_range(-0.1..0.1));
        Self { weight }
    }

    pub fn forward(&self, ids: &[usize]) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros((ids.len(), self.weight.ncols()));
        for (i, &id) in ids.iter().enumerate() {
            out.row_mut(i).assign(&self.weight.row(id));
        }
        out
    }
}

/// Fully connected layer.
pub struct Linear {
    weight: Array2<f32>, // out x in
    bias: Option<Array1<f32>>,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize, bias: bool) -> Self {
        let mut rng = rand::thread_rng();
        let weight =
            Array2::from_shape_fn((out_features, in_features), |_| rng.gen_range(-0.1..0.1));
        let bias = if bias {
            Some(Array1::from_shape_fn(out_features, |_| rng.gen_range(-0.1..0.1)))
        } else {
            None
        };
        Self { weight, bias }
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut y = x.dot(&self.weight.t());
        if let Some(b) = &self.bias {
            y += &b.view().insert_axis(Axis(0));
        }
        y
    }
}

/// Root mean square layer normalization.
pub struct RMSNorm {
    weight: Array1<f32>,
    eps: f32,
}

impl RMSNorm {
    pub fn new(dim: usize) -> Self {
        Self {
            weight: Array1::ones(dim),
            eps: 1e-6,
        }
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let mean = x.mapv(|v| v * v).mean_axis(Axis(1)).unwrap();
        let denom = mean.mapv(|m| (m + self.eps).sqrt()).insert_axis(Axis(1));
        let norm = x / &denom;
        norm * &self.weight.view().insert_axis(Axis(0))
    }
}

/// Multi-head causal self attention with a key/value cache.
pub struct Attention {
    wq: Linear,
    wk: Linear,
    wv: Linear,
    wo: Linear,
    n_heads: usize,
    head_dim: usize,
}

impl Attention {
    pub fn new(dim: usize, n_heads: usize) -> Self {
        let head_dim = dim / n_heads;
        Self {
            wq: Linear::new(dim, dim, false),
            wk: Linear::new(dim, dim, false),
            wv: Linear::new(dim, dim, false),
            wo: Linear::new(dim, dim, false),
            n_heads,
            head_dim,
        }
    }

    /// Attend the new rows of `x` over the cached prefix plus themselves.
    /// Returns the attention output and the extended cache.
    pub fn forward(&self, x: &Array2<f32>, past: Option<LayerPast>) -> (Array2<f32>, LayerPast) {
        let q = self.wq.forward(x);
        let k_new = self.wk.forward(x);
        let v_new = self.wv.forward(x);

        let offset = past.as_ref().map_or(0, LayerPast::len);
        let seq = x.nrows();
        let dim = self.n_heads * self.head_dim;

        let mut k = Array2::<f32>::zeros((offset + seq, dim));
        let mut v = Array2::<f32>::zeros((offset + seq, dim));
        if let Some(p) = past {
            k.slice_mut(s![..offset, ..]).assign(&p.k);
            v.slice_mut(s![..offset, ..]).assign(&p.v);
        }
        k.slice_mut(s![offset.., ..]).assign(&k_new);
        v.slice_mut(s![offset.., ..]).assign(&v_new);

        let mut out = Array2::<f32>::zeros((seq, dim));
        for h in 0..self.n_heads {
            let cols = h * self.head_dim..(h + 1) * self.head_dim;
            let qh = q.slice(s![.., cols.clone()]);
            let kh = k.slice(s![.., cols.clone()]);
            let vh = v.slice(s![.., cols.clone()]);

            for i in 0..seq {
                // Causal mask: the query at absolute position offset + i sees
                // keys up to and including itself.
                let visible = offset + i + 1;
                let mut scores = vec![0.0_f32; visible];
                for (j, score) in scores.iter_mut().enumerate() {
                    *score = qh.row(i).dot(&kh.row(j)) / (self.head_dim as f32).sqrt();
                }
                // softmax
                let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let mut sum = 0.0;
                for s in scores.iter_mut() {
                    *s = (*s - max).exp();
                    sum += *s;
                }
                for s in scores.iter_mut() {
                    *s /= sum;
                }
                // weighted sum
                for (j, &coeff) in scores.iter().enumerate() {
                    for d in 0..self.head_dim {
                        out[[i, h * self.head_dim + d]] += coeff * vh[[j, d]];
                    }
                }
            }
        }

        (self.wo.forward(&out), LayerPast { k, v })
    }
}

/// Simple feed-forward network using SILU activation.
pub struct MLP {
    w1: Linear,
    w2: Linear,
}

impl MLP {
    pub fn new(dim: usize, hidden_dim: usize) -> Self {
        Self {
            w1: Linear::new(dim, hidden_dim, false),
            w2: Linear::new(hidden_dim, dim, false),
        }
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let hidden = self.w1.forward(x).mapv(|v| v * (1.0 / (1.0 + (-v).exp()))); // silu
        self.w2.forward(&hidden)
    }
}

/// Transformer block consisting of attention and feed-forward layers.
pub struct Block {
    attn_norm: RMSNorm,
    attn: Attention,
    ffn_norm: RMSNorm,
    ffn: MLP,
}

impl Block {
    pub fn new(args: &ModelArgs) -> Self {
        Self {
            attn_norm: RMSNorm::new(args.dim),
            attn: Attention::new(args.dim, args.n_heads),
            ffn_norm: RMSNorm::new(args.dim),
            ffn: MLP::new(args.dim, args.hidden_dim),
        }
    }

    pub fn forward(&self, x: &Array2<f32>, past: Option<LayerPast>) -> (Array2<f32>, LayerPast) {
        let h = self.attn_norm.forward(x);
        let (h, present) = self.attn.forward(&h, past);
        let x = x + &h;
        let h = self.ffn_norm.forward(&x);
        let h = self.ffn.forward(&h);
        (x + &h, present)
    }
}

/// Full transformer model used for generation.
pub struct Transformer {
    pub args: ModelArgs,
    embed: Embedding,
    pos_embed: Embedding,
    layers: Vec<Block>,
    norm: RMSNorm,
    head: Linear,
}

impl Transformer {
    pub fn new(args: ModelArgs) -> Self {
        let embed = Embedding::new(args.vocab_size, args.dim);
        let pos_embed = Embedding::new(args.max_seq_len, args.dim);
        let layers = (0..args.n_layers).map(|_| Block::new(&args)).collect();
        let norm = RMSNorm::new(args.dim);
        let head = Linear::new(args.dim, args.vocab_size, false);
        Self {
            args,
            embed,
            pos_embed,
            layers,
            norm,
            head,
        }
    }

    /// Score `tokens` given the carried state, returning per-position logits
    /// for the fed tokens and the extended state.
    ///
    /// Positions default to the slots following the cached prefix. Token-type
    /// ids, when given, are embedded through the token table and added in.
    pub fn forward(
        &self,
        tokens: &[usize],
        positions: Option<&[usize]>,
        type_ids: Option<&[usize]>,
        past: Option<Past>,
    ) -> Result<(Array2<f32>, Past)> {
        if tokens.is_empty() {
            return Err(InferenceError::EmptyInput);
        }
        for &t in tokens {
            if t >= self.args.vocab_size {
                return Err(InferenceError::TokenOutOfRange {
                    id: t,
                    vocab_size: self.args.vocab_size,
                });
            }
        }

        let offset = past.as_ref().map_or(0, Past::len);
        let default_positions: Vec<usize>;
        let positions = match positions {
            Some(p) => p,
            None => {
                default_positions = (offset..offset + tokens.len()).collect();
                &default_positions[..]
            }
        };
        if positions.len() != tokens.len() {
            return Err(InferenceError::Oracle(format!(
                "got {} position ids for {} tokens",
                positions.len(),
                tokens.len()
            )));
        }
        for &p in positions {
            if p >= self.args.max_seq_len {
                return Err(InferenceError::ContextOverflow {
                    position: p,
                    max_seq_len: self.args.max_seq_len,
                });
            }
        }

        let mut h = self.embed.forward(tokens) + self.pos_embed.forward(positions);
        if let Some(type_ids) = type_ids {
            if type_ids.len() != tokens.len() {
                return Err(InferenceError::Oracle(format!(
                    "got {} type ids for {} tokens",
                    type_ids.len(),
                    tokens.len()
                )));
            }
            for &t in type_ids {
                if t >= self.args.vocab_size {
                    return Err(InferenceError::TokenOutOfRange {
                        id: t,
                        vocab_size: self.args.vocab_size,
                    });
                }
            }
            h = h + self.embed.forward(type_ids);
        }

        let layer_pasts: Vec<Option<LayerPast>> = match past {
            Some(p) => {
                if p.layers.len() != self.layers.len() {
                    return Err(InferenceError::Oracle(format!(
                        "carried state covers {} layers, model has {}",
                        p.layers.len(),
                        self.layers.len()
                    )));
                }
                p.layers.into_iter().map(Some).collect()
            }
            None => (0..self.layers.len()).map(|_| None).collect(),
        };

        let mut present = Vec::with_capacity(self.layers.len());
        for (layer, layer_past) in self.layers.iter().zip(layer_pasts) {
            let (next, kv) = layer.forward(&h, layer_past);
            h = next;
            present.push(kv);
        }

        let h = self.norm.forward(&h);
        let logits = self.head.forward(&h);
        Ok((logits, Past { layers: present }))
    }
}

impl Oracle for Transformer {
    type Past = Past;

    fn score(
        &self,
        tokens: &[usize],
        positions: Option<&[usize]>,
        type_ids: Option<&[usize]>,
        past: Option<Past>,
    ) -> Result<Step<Past>> {
        let (logits, past) = self.forward(tokens, positions, type_ids, past)?;
        let scores = logits.row(logits.nrows() - 1).to_owned();
        Ok(Step { scores, past })
    }
}
