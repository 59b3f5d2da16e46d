use anyhow::{Context, Result, bail};
use regex::Regex;

const MAX_GRID_POINTS: usize = 10_000;

/// Parses a threshold grid: `start:stop:step` (inclusive) or a comma list.
/// A blank spec is an empty grid.
pub fn parse_grid(spec: &str) -> Result<Vec<f64>> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let range = Regex::new(r"^\s*([0-9]*\.?[0-9]+)\s*:\s*([0-9]*\.?[0-9]+)\s*:\s*([0-9]*\.?[0-9]+)\s*$")
        .context("failed to compile grid range regex")?;

    let values = if let Some(captures) = range.captures(trimmed) {
        let start = parse_bound(captures.get(1).map(|m| m.as_str()), spec)?;
        let stop = parse_bound(captures.get(2).map(|m| m.as_str()), spec)?;
        let step = parse_bound(captures.get(3).map(|m| m.as_str()), spec)?;
        expand_range(start, stop, step, spec)?
    } else {
        trimmed
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| {
                value
                    .parse::<f64>()
                    .with_context(|| format!("invalid grid value '{value}' in '{spec}'"))
            })
            .collect::<Result<Vec<f64>>>()?
    };

    for value in &values {
        if !value.is_finite() || !(0.0..=1.0).contains(value) {
            bail!("grid value {value} in '{spec}' is outside [0, 1]");
        }
    }

    Ok(values)
}

fn parse_bound(raw: Option<&str>, spec: &str) -> Result<f64> {
    raw.with_context(|| format!("missing range component in '{spec}'"))?
        .parse::<f64>()
        .with_context(|| format!("invalid range component in '{spec}'"))
}

fn expand_range(start: f64, stop: f64, step: f64, spec: &str) -> Result<Vec<f64>> {
    if step <= 0.0 {
        bail!("grid step must be positive in '{spec}'");
    }
    if start > stop {
        bail!("grid start exceeds stop in '{spec}'");
    }

    let count = ((stop - start) / step + 1e-9).floor() as usize + 1;
    if count > MAX_GRID_POINTS {
        bail!("grid '{spec}' expands to {count} points (max {MAX_GRID_POINTS})");
    }

    Ok((0..count)
        .map(|index| round6(start + step * index as f64))
        .collect())
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::parse_grid;

    #[test]
    fn range_spec_is_inclusive_and_rounded() {
        let values = parse_grid("0.5:0.7:0.05").expect("range should parse");
        assert_eq!(values, vec![0.5, 0.55, 0.6, 0.65, 0.7]);
    }

    #[test]
    fn comma_list_and_blank_spec() {
        assert_eq!(parse_grid("0.1, 0.3,0.2").expect("list"), vec![0.1, 0.3, 0.2]);
        assert!(parse_grid("   ").expect("blank").is_empty());
    }

    #[test]
    fn rejects_malformed_specs() {
        assert!(parse_grid("0.9:0.1:0.1").is_err());
        assert!(parse_grid("0.1:0.9:0").is_err());
        assert!(parse_grid("0.1,abc").is_err());
        assert!(parse_grid("1.5").is_err());
    }
}
