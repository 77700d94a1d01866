//! "Did you mean" suggestions for unknown command names.

/// Closest candidate to `name`: the shortest candidate sharing it as a
/// prefix, else the nearest one within edit distance 2.
pub fn best_suggestion<'a, I>(name: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    if name.is_empty() {
        return None;
    }
    let mut best_prefix: Option<&str> = None;
    let mut best: Option<&str> = None;
    let mut best_dist = usize::MAX;
    for candidate in candidates {
        if candidate.is_empty() || candidate == name {
            continue;
        }
        if candidate.starts_with(name) {
            best_prefix = match best_prefix {
                Some(current) if current.len() <= candidate.len() => Some(current),
                _ => Some(candidate),
            };
            continue;
        }
        let dist = edit_distance(name, candidate, 2);
        if dist <= 2 && dist < best_dist {
            best_dist = dist;
            best = Some(candidate);
        }
    }
    best_prefix.or(best).map(str::to_string)
}

/// Names of executables on `PATH`, for suggestion candidates.
pub fn path_commands(path: &str) -> Vec<String> {
    let mut names = Vec::new();
    for dir in path.split(':').filter(|dir| !dir.is_empty()) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    names.dedup();
    names
}

fn edit_distance(a: &str, b: &str, max: usize) -> usize {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    if a_bytes.is_empty() {
        return b_bytes.len();
    }
    if b_bytes.is_empty() {
        return a_bytes.len();
    }
    let mut prev: Vec<usize> = (0..=b_bytes.len()).collect();
    let mut cur = vec![0; b_bytes.len() + 1];
    for (i, &a_byte) in a_bytes.iter().enumerate() {
        cur[0] = i + 1;
        let mut row_min = cur[0];
        for (j, &b_byte) in b_bytes.iter().enumerate() {
            let cost = usize::from(a_byte != b_byte);
            let value = (cur[j] + 1).min(prev[j + 1] + 1).min(prev[j] + cost);
            cur[j + 1] = value;
            row_min = row_min.min(value);
        }
        // Every later row is at least this large.
        if row_min > max {
            return row_min;
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b_bytes.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_close_names() {
        let names = ["echo", "export", "exit"];
        assert_eq!(best_suggestion("ecoh", names), Some("echo".to_string()));
        assert_eq!(best_suggestion("exp", names), Some("export".to_string()));
        assert_eq!(best_suggestion("zzzzzz", names), None);
    }

    #[test]
    fn distance_is_bounded() {
        assert_eq!(edit_distance("kitten", "sitting", 5), 3);
        assert!(edit_distance("abc", "xyzuvw", 2) > 2);
    }
}
