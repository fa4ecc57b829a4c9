use anyhow::{Result, anyhow};
use tokenizers::Tokenizer;

/// CLIP context length.
pub const CLIP_MAX_LEN: usize = 77;
pub const CLIP_EOS_TOKEN: &str = "<|endoftext|>";

/// Tokenize for the CLIP text tower. Over-long input is cut to `max_len`
/// keeping the end-of-text token last, since the text tower pools at it.
pub fn tokenize_clip(tokenizer: &Tokenizer, text: &str, max_len: usize, eos_id: u32) -> Result<Vec<u32>> {
    let enc = tokenizer.encode(text, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let mut ids = enc.get_ids().to_vec();
    if ids.is_empty() { return Err(anyhow!("Tokenization produced no tokens")); }
    if ids.len() > max_len {
        ids.truncate(max_len);
        if let Some(last) = ids.last_mut() { *last = eos_id; }
    }
    Ok(ids)
}

pub fn eos_token_id(tokenizer: &Tokenizer) -> Result<u32> {
    tokenizer.token_to_id(CLIP_EOS_TOKEN).ok_or_else(|| anyhow!("tokenizer has no {} token", CLIP_EOS_TOKEN))
}
