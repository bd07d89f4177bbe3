//! Dataset subset selection
//!
//! A selection names subsets of a dataset with slice bounds:
//! `train[:80%]+test[80%:]` or `dev[0:500]`. Bounds within one subset are
//! either both percentages or both absolute indices. An omitted start is 0
//! and an omitted end is the end of the data.

use tracing::debug;

use crate::error::{Error, Result};

/// One slice bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Absolute(usize),
    /// Whole percent, `0..=100`.
    Percent(u32),
}

impl Bound {
    fn is_percent(&self) -> bool {
        matches!(self, Bound::Percent(_))
    }

    /// Index of this bound in a dataset of `len` items, before clamping.
    fn resolve(&self, len: usize) -> usize {
        match *self {
            Bound::Absolute(index) => index,
            Bound::Percent(p) => (p as usize * len) / 100,
        }
    }
}

/// Bounds of one named subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subset {
    pub name: String,
    pub start: Bound,
    pub end: Bound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSelection {
    subsets: Vec<Subset>,
}

impl DatasetSelection {
    /// Parse `name[start:end]+name[start:end]...`.
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidSelection {
            spec: spec.to_string(),
            reason,
        };

        let mut subsets: Vec<Subset> = Vec::new();
        for part in spec.split('+') {
            let open = part
                .find('[')
                .ok_or_else(|| invalid(format!("subset {part:?} has no slice")))?;
            let inner = part[open + 1..]
                .strip_suffix(']')
                .ok_or_else(|| invalid(format!("subset {part:?} is not closed by ']'")))?;
            let (start, end) = inner
                .split_once(':')
                .ok_or_else(|| invalid(format!("slice {inner:?} has no ':'")))?;

            let name = part[..open].to_string();
            let start = parse_bound(start).map_err(&invalid)?;
            let end = parse_bound(end).map_err(&invalid)?;

            let (start, end) = match (start, end) {
                (Some(s), Some(e)) if s.is_percent() != e.is_percent() => {
                    return Err(invalid(format!(
                        "subset {name:?} mixes percentage and absolute bounds"
                    )));
                }
                (Some(s), Some(e)) => (s, e),
                (None, Some(e @ Bound::Absolute(_))) => (Bound::Absolute(0), e),
                (None, Some(e)) => (Bound::Percent(0), e),
                (Some(s @ Bound::Absolute(_)), None) => (s, Bound::Absolute(usize::MAX)),
                (Some(s), None) => (s, Bound::Percent(100)),
                (None, None) => (Bound::Percent(0), Bound::Percent(100)),
            };

            if subsets.iter().any(|s| s.name == name) {
                return Err(invalid(format!("subset {name:?} is selected twice")));
            }
            subsets.push(Subset { name, start, end });
        }

        Ok(Self { subsets })
    }

    pub fn subsets(&self) -> &[Subset] {
        &self.subsets
    }

    /// Directory-safe name of each subset; an unnamed subset becomes `_empty`.
    pub fn disk_names(&self) -> Vec<String> {
        self.subsets
            .iter()
            .map(|s| {
                if s.name.is_empty() {
                    "_empty".to_string()
                } else {
                    s.name.clone()
                }
            })
            .collect()
    }

    /// Index ranges of each subset in a dataset of `len` items.
    ///
    /// When every subset is given in percent and the widths add up to 100%,
    /// rounding losses go to the first subset and the later subsets shift
    /// right, so the subsets cover all `len` items.
    pub fn ranges(&self, len: usize) -> Vec<(String, std::ops::Range<usize>)> {
        let mut bounds: Vec<(usize, usize)> = self
            .subsets
            .iter()
            .map(|s| (s.start.resolve(len).min(len), s.end.resolve(len).min(len)))
            .collect();

        let all_percent = self.subsets.iter().all(|s| s.start.is_percent());
        if all_percent {
            let total_percent: i64 = self
                .subsets
                .iter()
                .map(|s| match (s.start, s.end) {
                    (Bound::Percent(a), Bound::Percent(b)) => b as i64 - a as i64,
                    _ => 0,
                })
                .sum();
            let selected: usize = bounds.iter().map(|(s, e)| e.saturating_sub(*s)).sum();

            if total_percent == 100 && selected < len {
                let shortfall = len - selected;
                debug!(
                    len,
                    selected, "Selection covers 100% but misses items, growing the first subset"
                );
                for (i, (start, end)) in bounds.iter_mut().enumerate() {
                    if i != 0 {
                        *start += shortfall;
                    }
                    *end += shortfall;
                }
            }
        }

        self.subsets
            .iter()
            .zip(bounds)
            .map(|(s, (start, end))| {
                let start = start.min(len);
                (s.name.clone(), start..end.clamp(start, len))
            })
            .collect()
    }

    /// Split `items` into the selected subsets, in selection order.
    pub fn select<'a, T>(&self, items: &'a [T]) -> Vec<(String, &'a [T])> {
        self.ranges(items.len())
            .into_iter()
            .map(|(name, range)| (name, &items[range]))
            .collect()
    }
}

/// Split `dataset:selection` into its two parts. The selection may be empty.
pub fn split_dataset_and_selection(spec: &str) -> Result<(String, String)> {
    let dataset_end = spec.find([':', '[']).unwrap_or(spec.len());
    let dataset = &spec[..dataset_end];
    if dataset.is_empty() {
        return Err(Error::InvalidSelection {
            spec: spec.to_string(),
            reason: "missing dataset name".to_string(),
        });
    }

    let rest = &spec[dataset_end..];
    let selection = rest.strip_prefix(':').unwrap_or(rest);
    Ok((dataset.to_string(), selection.to_string()))
}

fn parse_bound(raw: &str) -> std::result::Result<Option<Bound>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    if let Some(number) = raw.strip_suffix('%') {
        let percent: u32 = number
            .parse()
            .map_err(|_| format!("invalid percentage {raw:?}"))?;
        if percent > 100 {
            return Err(format!("percentage {raw:?} exceeds 100%"));
        }
        return Ok(Some(Bound::Percent(percent)));
    }

    raw.parse()
        .map(|index| Some(Bound::Absolute(index)))
        .map_err(|_| format!("invalid index {raw:?}"))
}
