use anyhow::Result;
use burn::{
    nn::{
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Linear, LinearConfig,
        Lstm, LstmConfig, LstmState,
    },
    prelude::*,
    tensor::activation::softmax,
};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

// ─── Model contract ───────────────────────────────────────────────────────────
/// What the training loop, validation and inference driver need
/// from a translation model. Nothing else about the network leaks out.
pub trait Seq2SeqModel<B: Backend> {
    /// Teacher-forced pass. Returns logits `[batch, target_len, vocab]`;
    /// position 0 is the decoder's forced first step and is never scored.
    fn forward_train(
        &self,
        source_ids:     Tensor<B, 2, Int>,
        source_lengths: Tensor<B, 1, Int>,
        target_ids:     Tensor<B, 2, Int>,
        target_lengths: Tensor<B, 1, Int>,
    ) -> Tensor<B, 3>;

    /// Greedy decode from `sos_id` for at most `max_len` steps,
    /// stopping early once every row has emitted the model's end token.
    fn forward_infer(
        &self,
        source_ids:     Tensor<B, 2, Int>,
        source_lengths: Tensor<B, 1, Int>,
        sos_id:         u32,
        max_len:        usize,
    ) -> GreedyDecode<B>;
}

pub struct GreedyDecode<B: Backend> {
    /// [batch, steps]
    pub ids: Tensor<B, 2, Int>,
    /// [batch, steps, vocab]
    pub logits: Tensor<B, 3>,
}

impl<B: Backend> GreedyDecode<B> {
    /// Copy ids to the host, one row per input, each cut before `eos_id`.
    pub fn sequences(self, eos_id: Option<u32>) -> Result<Vec<Vec<u32>>> {
        let [batch, steps] = self.ids.dims();
        let flat = self
            .ids
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| anyhow::anyhow!("Cannot read decoded ids: {e:?}"))?;

        let rows = (0..batch)
            .map(|row| {
                flat[row * steps..(row + 1) * steps]
                    .iter()
                    .map(|&id| id as u32)
                    .take_while(|&id| Some(id) != eos_id)
                    .collect()
            })
            .collect();
        Ok(rows)
    }
}

// ─── Model kinds ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// LSTM encoder, LSTM decoder seeded with the final encoder state
    Seq2seq,
    /// Seq2seq plus dot-product attention over the encoder outputs
    Seq2seqAttention,
}

// ─── Configuration ────────────────────────────────────────────────────────────
// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct Seq2SeqConfig {
    pub kind:       ModelKind,
    /// Source vocabulary size
    pub input_dim:  usize,
    /// Target vocabulary size
    pub output_dim: usize,
    pub pad_id:     usize,
    pub eos_id:     usize,
    #[config(default = 256)]
    pub embed_dim:  usize,
    #[config(default = 512)]
    pub hidden_dim: usize,
    #[config(default = 2)]
    pub num_layers: usize,
    #[config(default = 0.5)]
    pub dropout:    f64,
}

impl Seq2SeqConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Seq2Seq<B> {
        let layers = self.num_layers.max(1);
        let stack = |device: &B::Device| -> Vec<Lstm<B>> {
            (0..layers)
                .map(|i| {
                    let d_input = if i == 0 { self.embed_dim } else { self.hidden_dim };
                    LstmConfig::new(d_input, self.hidden_dim, true).init(device)
                })
                .collect()
        };

        let attention = match self.kind {
            ModelKind::Seq2seq => None,
            ModelKind::Seq2seqAttention => {
                Some(LinearConfig::new(2 * self.hidden_dim, self.hidden_dim).init(device))
            }
        };

        Seq2Seq {
            source_embedding: EmbeddingConfig::new(self.input_dim, self.embed_dim).init(device),
            target_embedding: EmbeddingConfig::new(self.output_dim, self.embed_dim).init(device),
            encoder:          stack(device),
            decoder:          stack(device),
            attention,
            projection:       LinearConfig::new(self.hidden_dim, self.output_dim).init(device),
            dropout:          DropoutConfig::new(self.dropout).init(),
            pad_id:           self.pad_id,
            eos_id:           self.eos_id,
            hidden_dim:       self.hidden_dim,
        }
    }
}

// ─── Network ──────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct Seq2Seq<B: Backend> {
    pub source_embedding: Embedding<B>,
    pub target_embedding: Embedding<B>,
    pub encoder:          Vec<Lstm<B>>,
    pub decoder:          Vec<Lstm<B>>,
    pub attention:        Option<Linear<B>>,
    pub projection:       Linear<B>,
    pub dropout:          Dropout,
    pub pad_id:           usize,
    pub eos_id:           usize,
    pub hidden_dim:       usize,
}

#[derive(Clone)]
struct RecurrentState<B: Backend> {
    cell:   Tensor<B, 2>,
    hidden: Tensor<B, 2>,
}

impl<B: Backend> RecurrentState<B> {
    fn zeros(batch: usize, hidden: usize, device: &B::Device) -> Self {
        Self {
            cell:   Tensor::zeros([batch, hidden], device),
            hidden: Tensor::zeros([batch, hidden], device),
        }
    }

    /// Take `self` where `keep` is 1 and `previous` where it is 0.
    fn blend(self, previous: &Self, keep: Tensor<B, 2>) -> Self {
        let hold = keep.clone().neg().add_scalar(1.0);
        Self {
            cell:   self.cell * keep.clone() + previous.cell.clone() * hold.clone(),
            hidden: self.hidden * keep + previous.hidden.clone() * hold,
        }
    }
}

struct Memory<B: Backend> {
    /// [batch, src_len, hidden], zero past each sentence's end
    outputs:      Tensor<B, 3>,
    /// [batch, 1, src_len], true on padding
    padding_mask: Tensor<B, 3, Bool>,
    states:       Vec<RecurrentState<B>>,
}

/// Run one time step through a stack of LSTM layers.
fn step_layers<B: Backend>(
    layers:  &[Lstm<B>],
    dropout: &Dropout,
    input:   Tensor<B, 3>,
    states:  &[RecurrentState<B>],
) -> (Tensor<B, 3>, Vec<RecurrentState<B>>) {
    let mut x    = input;
    let mut next = Vec::with_capacity(layers.len());
    for (i, (lstm, state)) in layers.iter().zip(states).enumerate() {
        if i > 0 {
            x = dropout.forward(x);
        }
        let (out, s) = lstm.forward(x, Some(LstmState::new(state.cell.clone(), state.hidden.clone())));
        next.push(RecurrentState { cell: s.cell, hidden: s.hidden });
        x = out;
    }
    (x, next)
}

impl<B: Backend> Seq2Seq<B> {
    fn zero_states(&self, batch: usize, device: &B::Device) -> Vec<RecurrentState<B>> {
        (0..self.encoder.len())
            .map(|_| RecurrentState::zeros(batch, self.hidden_dim, device))
            .collect()
    }

    /// Step through the source one position at a time. Past a row's
    /// length its state is frozen, so the final state is the state at
    /// the true end of the sentence rather than after the padding.
    fn encode(&self, source_ids: Tensor<B, 2, Int>, source_lengths: Tensor<B, 1, Int>) -> Memory<B> {
        let [batch, src_len] = source_ids.dims();
        let device = source_ids.device();

        let padding_mask = source_ids.clone().equal_elem(self.pad_id as i32).unsqueeze_dim::<3>(1);
        let embedded = self.dropout.forward(self.source_embedding.forward(source_ids));
        let [_, _, embed_dim] = embedded.dims();

        let mut states  = self.zero_states(batch, &device);
        let mut outputs = Vec::with_capacity(src_len);
        for t in 0..src_len {
            let keep = source_lengths
                .clone()
                .greater_elem(t as i32)
                .float()
                .reshape([batch, 1])
                .expand([batch, self.hidden_dim]);

            let x = embedded.clone().slice([0..batch, t..t + 1, 0..embed_dim]);
            let (out, next) = step_layers(&self.encoder, &self.dropout, x, &states);
            states = next
                .into_iter()
                .zip(&states)
                .map(|(n, prev)| n.blend(prev, keep.clone()))
                .collect();

            let out = out.reshape([batch, self.hidden_dim]) * keep;
            outputs.push(out.unsqueeze_dim::<3>(1));
        }

        Memory { outputs: Tensor::cat(outputs, 1), padding_mask, states }
    }

    fn attend(&self, combine: &Linear<B>, query: Tensor<B, 3>, memory: &Memory<B>) -> Tensor<B, 3> {
        let scores  = query.clone().matmul(memory.outputs.clone().swap_dims(1, 2));
        let weights = softmax(scores.mask_fill(memory.padding_mask.clone(), -1.0e9), 2);
        let context = weights.matmul(memory.outputs.clone());
        combine.forward(Tensor::cat(vec![query, context], 2)).tanh()
    }

    /// One decoder step: previous tokens [batch] → logits [batch, vocab].
    fn decode_step(
        &self,
        tokens: Tensor<B, 1, Int>,
        states: &[RecurrentState<B>],
        memory: &Memory<B>,
    ) -> (Tensor<B, 2>, Vec<RecurrentState<B>>) {
        let [batch] = tokens.dims();
        let embedded = self.dropout.forward(self.target_embedding.forward(tokens.reshape([batch, 1])));
        let (out, next) = step_layers(&self.decoder, &self.dropout, embedded, states);

        let out = match &self.attention {
            Some(combine) => self.attend(combine, out, memory),
            None => out,
        };

        let logits = self.projection.forward(self.dropout.forward(out));
        let [_, _, vocab] = logits.dims();
        (logits.reshape([batch, vocab]), next)
    }
}

impl<B: Backend> Seq2SeqModel<B> for Seq2Seq<B> {
    fn forward_train(
        &self,
        source_ids:      Tensor<B, 2, Int>,
        source_lengths:  Tensor<B, 1, Int>,
        target_ids:      Tensor<B, 2, Int>,
        _target_lengths: Tensor<B, 1, Int>,
    ) -> Tensor<B, 3> {
        let [batch, trg_len] = target_ids.dims();
        let device = target_ids.device();
        let [_, vocab] = self.projection.weight.val().dims();

        let memory     = self.encode(source_ids, source_lengths);
        let mut states = memory.states.clone();

        let mut steps = Vec::with_capacity(trg_len);
        steps.push(Tensor::<B, 2>::zeros([batch, vocab], &device).unsqueeze_dim::<3>(1));
        for t in 1..trg_len {
            let previous = target_ids.clone().slice([0..batch, t - 1..t]).reshape([batch]);
            let (logits, next) = self.decode_step(previous, &states, &memory);
            states = next;
            steps.push(logits.unsqueeze_dim::<3>(1));
        }

        Tensor::cat(steps, 1)
    }

    fn forward_infer(
        &self,
        source_ids:     Tensor<B, 2, Int>,
        source_lengths: Tensor<B, 1, Int>,
        sos_id:         u32,
        max_len:        usize,
    ) -> GreedyDecode<B> {
        let [batch, _] = source_ids.dims();
        let device = source_ids.device();

        let memory     = self.encode(source_ids, source_lengths);
        let mut states = memory.states.clone();

        let mut token    = Tensor::<B, 1, Int>::full([batch], sos_id as i32, &device);
        let mut finished = Tensor::<B, 1, Int>::zeros([batch], &device);
        let mut ids      = Vec::new();
        let mut logits   = Vec::new();

        for _ in 0..max_len.max(1) {
            let (step_logits, next) = self.decode_step(token, &states, &memory);
            states = next;

            let next_token = step_logits.clone().argmax(1).reshape([batch]);
            ids.push(next_token.clone().unsqueeze_dim::<2>(1));
            logits.push(step_logits.unsqueeze_dim::<3>(1));

            finished = finished + next_token.clone().equal_elem(self.eos_id as i32).int();
            token    = next_token;

            let done: i64 = finished.clone().greater_elem(0).int().sum().into_scalar().elem::<i64>();
            if done as usize == batch {
                break;
            }
        }

        GreedyDecode { ids: Tensor::cat(ids, 1), logits: Tensor::cat(logits, 1) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_utils::{tiny_config, tiny_batch, TestBackend};

    #[test]
    fn test_train_logits_shape_and_zero_first_step() {
        let device = Default::default();
        let model  = tiny_config(ModelKind::Seq2seq).init::<TestBackend>(&device);
        let batch  = tiny_batch::<TestBackend>(&device);
        let [b, t] = batch.target_ids.dims();

        let logits = model.forward_train(
            batch.source_ids, batch.source_lengths, batch.target_ids, batch.target_lengths,
        );
        assert_eq!(logits.dims(), [b, t, 12]);

        let first: f32 = logits
            .slice([0..b, 0..1, 0..12])
            .abs()
            .sum()
            .into_scalar()
            .elem::<f32>();
        assert_eq!(first, 0.0);
    }

    #[test]
    fn test_attention_variant_runs() {
        let device = Default::default();
        let model  = tiny_config(ModelKind::Seq2seqAttention).init::<TestBackend>(&device);
        assert!(model.attention.is_some());

        let batch  = tiny_batch::<TestBackend>(&device);
        let out    = model.forward_infer(batch.source_ids, batch.source_lengths, 2, 4);
        let [b, steps] = out.ids.dims();
        assert_eq!(b, 2);
        assert!(steps >= 1 && steps <= 4);
        assert_eq!(out.logits.dims(), [b, steps, 12]);
    }

    #[test]
    fn test_padding_does_not_change_encoding() {
        // The same sentence padded to different widths must decode identically.
        let device = Default::default();
        let model  = tiny_config(ModelKind::Seq2seq).init::<TestBackend>(&device);

        let short = Tensor::<TestBackend, 1, Int>::from_ints([2, 5, 6, 3].as_slice(), &device)
            .reshape([1, 4]);
        let padded = Tensor::<TestBackend, 1, Int>::from_ints([2, 5, 6, 3, 1, 1].as_slice(), &device)
            .reshape([1, 6]);
        let len = Tensor::<TestBackend, 1, Int>::from_ints([4].as_slice(), &device);

        let a = model.forward_infer(short, len.clone(), 2, 5).sequences(None).unwrap();
        let b = model.forward_infer(padded, len, 2, 5).sequences(None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sequences_cut_at_eos() {
        let device = Default::default();
        let ids = Tensor::<TestBackend, 1, Int>::from_ints([7, 3, 9, 8, 8, 3].as_slice(), &device)
            .reshape([2, 3]);
        let decode = GreedyDecode { ids, logits: Tensor::<TestBackend, 3>::zeros([2, 3, 1], &device) };
        assert_eq!(decode.sequences(Some(3)).unwrap(), vec![vec![7], vec![8, 8]]);
    }
}
