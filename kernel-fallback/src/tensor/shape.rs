use anyhow::{anyhow, Result};

/// Element count of a shape whose data already exists.
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().copied().product::<usize>()
}

/// Element count of an untrusted shape. Errors when it overflows `usize`.
pub fn checked_numel(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| anyhow!("tensor shape {:?} overflows the element count", shape))
}

pub(crate) fn check_len(shape: &[usize], len: usize) -> Result<()> {
    let expected = checked_numel(shape)?;
    if expected != len {
        return Err(anyhow!(
            "tensor shape {:?} expects {} values, got {}",
            shape,
            expected,
            len
        ));
    }
    Ok(())
}

/// Render a shape the way kernel diagnostics print it, e.g. `[2,3]`.
pub fn shape_debug_string(shape: &[usize]) -> String {
    let dims = shape
        .iter()
        .map(|dim| dim.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("[{}]", dims)
}
