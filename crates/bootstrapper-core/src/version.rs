use std::cmp::Ordering;
use std::fmt;

/// A dotted version string with mixed numeric and alphabetic components.
///
/// Components are split on `.` and on every digit/non-digit boundary, so
/// `"10.6b2"` becomes `[10, 6, "b", 2]`. Two versions compare equal when they
/// only differ by trailing zero components (`"10.6" == "10.6.0"`).
#[derive(Debug, Clone)]
pub struct LooseVersion {
    raw: String,
    components: Vec<VersionComponent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum VersionComponent {
    // Digits with leading zeros stripped, so arbitrarily long runs never overflow.
    Number(String),
    Text(String),
}

impl VersionComponent {
    fn zero() -> Self {
        Self::Number(String::new())
    }

    fn number(digits: &str) -> Self {
        Self::Number(digits.trim_start_matches('0').to_string())
    }
}

impl Ord for VersionComponent {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(left), Self::Number(right)) => {
                left.len().cmp(&right.len()).then_with(|| left.cmp(right))
            }
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
            (Self::Text(left), Self::Text(right)) => left.cmp(right),
        }
    }
}

impl PartialOrd for VersionComponent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl LooseVersion {
    pub fn parse(raw: &str) -> Self {
        let mut components = Vec::new();
        for segment in raw.split('.') {
            let mut run = String::new();
            let mut run_is_digit = false;
            for ch in segment.chars() {
                let is_digit = ch.is_ascii_digit();
                if !run.is_empty() && is_digit != run_is_digit {
                    components.push(finish_run(&run, run_is_digit));
                    run.clear();
                }
                run_is_digit = is_digit;
                run.push(ch);
            }
            if !run.is_empty() {
                components.push(finish_run(&run, run_is_digit));
            }
        }

        Self {
            raw: raw.to_string(),
            components,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn finish_run(run: &str, is_digit: bool) -> VersionComponent {
    if is_digit {
        VersionComponent::number(run)
    } else {
        VersionComponent::Text(run.to_string())
    }
}

impl Ord for LooseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let width = self.components.len().max(other.components.len());
        let zero = VersionComponent::zero();
        for index in 0..width {
            let left = self.components.get(index).unwrap_or(&zero);
            let right = other.components.get(index).unwrap_or(&zero);
            let ordering = left.cmp(right);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for LooseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for LooseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LooseVersion {}

impl fmt::Display for LooseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

pub fn compare_versions(left: &str, right: &str) -> Ordering {
    LooseVersion::parse(left).cmp(&LooseVersion::parse(right))
}
