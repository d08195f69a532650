use onnxruntime::ndarray::{Array, Array2};
use tokenizers::Tokenizer;

use crate::cache::LoadedModel;
use crate::SemanticError;

/// Embed `texts` in one session call, truncating each to `max_sequence_length`
/// tokens.
///
/// Models that emit token-level hidden states (`[batch, seq, hidden]`) are
/// mean-pooled over the attention mask; models with a pooled output
/// (`[batch, hidden]`) are returned row by row.
pub(crate) fn run_onnx_embeddings(
    model: &LoadedModel,
    texts: &[String],
    max_sequence_length: usize,
) -> Result<Vec<Vec<f32>>, SemanticError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let (encoded, seq_len) = encode_documents(&model.tokenizer, texts, max_sequence_length)?;
    let (input_ids, attn_mask) = build_padded_arrays(encoded, seq_len)?;
    execute_session(model, input_ids, attn_mask)
}

struct EncodedDoc {
    ids: Vec<i64>,
    mask: Vec<i64>,
}

fn encode_documents(
    tokenizer: &Tokenizer,
    texts: &[String],
    max_sequence_length: usize,
) -> Result<(Vec<EncodedDoc>, usize), SemanticError> {
    let mut encoded = Vec::with_capacity(texts.len());
    let mut seq_len = 0usize;

    for text in texts {
        let encoding = tokenizer
            .encode(text.as_str(), true)
            .map_err(|e| SemanticError::Inference(e.to_string()))?;
        let mut ids: Vec<i64> = encoding.get_ids().iter().map(|&x| x as i64).collect();
        let mut mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&x| x as i64)
            .collect();
        ids.truncate(max_sequence_length);
        mask.truncate(max_sequence_length);
        seq_len = seq_len.max(ids.len());
        encoded.push(EncodedDoc { ids, mask });
    }

    Ok((encoded, seq_len.max(1)))
}

fn build_padded_arrays(
    encoded: Vec<EncodedDoc>,
    seq_len: usize,
) -> Result<(Array2<i64>, Array2<i64>), SemanticError> {
    let batch = encoded.len();
    let mut id_storage = Vec::with_capacity(batch * seq_len);
    let mut mask_storage = Vec::with_capacity(batch * seq_len);

    for EncodedDoc { ids, mask } in encoded {
        if ids.len() != mask.len() {
            return Err(SemanticError::Inference(
                "tokenizer produced mismatched id/mask lengths".into(),
            ));
        }
        let pad = seq_len - ids.len();
        id_storage.extend(ids);
        id_storage.extend(std::iter::repeat_n(0, pad));
        mask_storage.extend(mask);
        mask_storage.extend(std::iter::repeat_n(0, pad));
    }

    let input_ids = Array::from_shape_vec((batch, seq_len), id_storage)
        .map_err(|e| SemanticError::Inference(e.to_string()))?;
    let attn_mask = Array::from_shape_vec((batch, seq_len), mask_storage)
        .map_err(|e| SemanticError::Inference(e.to_string()))?;
    Ok((input_ids, attn_mask))
}

fn execute_session(
    model: &LoadedModel,
    input_ids: Array2<i64>,
    attn_mask: Array2<i64>,
) -> Result<Vec<Vec<f32>>, SemanticError> {
    let (batch, seq_len) = input_ids.dim();
    let mask_rows: Vec<Vec<i64>> = attn_mask.outer_iter().map(|row| row.to_vec()).collect();

    let mut session = model.session.borrow_mut();
    let mut inputs = Vec::with_capacity(session.inputs.len());
    let mut input_ids = Some(input_ids);
    let mut attn_mask = Some(attn_mask);
    for input in &session.inputs {
        let tensor = match input.name.as_str() {
            "input_ids" => input_ids.take(),
            "attention_mask" => attn_mask.take(),
            "token_type_ids" => Some(Array::from_elem((batch, seq_len), 0_i64)),
            other => {
                return Err(SemanticError::Inference(format!(
                    "unsupported model input '{other}'"
                )))
            }
        };
        let tensor = tensor.ok_or_else(|| {
            SemanticError::InvalidConfig(format!("model requested `{}` twice", input.name))
        })?;
        inputs.push(tensor.into_dyn());
    }
    if inputs.is_empty() {
        return Err(SemanticError::Inference(
            "model did not declare any inputs".into(),
        ));
    }

    let outputs = session
        .run::<i64, f32, _>(inputs)
        .map_err(|e| SemanticError::Inference(e.to_string()))?;
    let output = outputs
        .into_iter()
        .next()
        .ok_or_else(|| SemanticError::Inference("model returned no outputs".into()))?;

    let shape = output.shape().to_vec();
    let flat: Vec<f32> = output.iter().copied().collect();
    match shape.as_slice() {
        [b, hidden] if *b == batch => Ok(flat.chunks(*hidden).map(<[f32]>::to_vec).collect()),
        [b, tokens, hidden] if *b == batch => Ok(mean_pool(&flat, &mask_rows, *tokens, *hidden)),
        other => Err(SemanticError::Inference(format!(
            "unexpected output shape {other:?} for batch {batch}"
        ))),
    }
}

/// Average token vectors whose attention mask is set.
fn mean_pool(flat: &[f32], masks: &[Vec<i64>], tokens: usize, hidden: usize) -> Vec<Vec<f32>> {
    masks
        .iter()
        .enumerate()
        .map(|(row, mask)| {
            let mut pooled = vec![0.0f32; hidden];
            let mut count = 0usize;
            for (t, &m) in mask.iter().enumerate().take(tokens) {
                if m == 0 {
                    continue;
                }
                let offset = (row * tokens + t) * hidden;
                for (acc, v) in pooled.iter_mut().zip(&flat[offset..offset + hidden]) {
                    *acc += v;
                }
                count += 1;
            }
            if count > 0 {
                let inv = 1.0 / count as f32;
                pooled.iter_mut().for_each(|v| *v *= inv);
            }
            pooled
        })
        .collect()
}
