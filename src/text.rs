// ── Natural sort ──────────────────────────────────────────────────────────────
//
// Pure Rust; no OS calls.  Used for ordering file names the way a person
// expects (`file2` before `file10`).

use std::cmp::Ordering;

/// Compare two strings in natural order.
///
/// Runs of ASCII digits compare by numeric value, everything else compares
/// case-insensitively.  Equal-valued digit runs with different lengths
/// (`07` vs `7`) order the shorter run first, and a final byte comparison
/// keeps the order total.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (x, y) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    while i < x.len() && j < y.len() {
        if x[i].is_ascii_digit() && y[j].is_ascii_digit() {
            let (ea, eb) = (digit_run_end(x, i), digit_run_end(y, j));
            let ord = cmp_digit_runs(&x[i..ea], &y[j..eb]);
            if ord != Ordering::Equal {
                return ord;
            }
            i = ea;
            j = eb;
            continue;
        }

        let ord = x[i].to_ascii_lowercase().cmp(&y[j].to_ascii_lowercase());
        if ord != Ordering::Equal {
            return ord;
        }
        i += 1;
        j += 1;
    }

    (x.len() - i).cmp(&(y.len() - j)).then_with(|| x.cmp(y))
}

fn digit_run_end(s: &[u8], start: usize) -> usize {
    s[start..]
        .iter()
        .position(|c| !c.is_ascii_digit())
        .map_or(s.len(), |n| start + n)
}

/// Numeric comparison without parsing, so arbitrarily long runs never overflow.
fn cmp_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    let strip = |s: &[u8]| -> usize { s.iter().take_while(|&&c| c == b'0').count() };
    let (na, nb) = (&a[strip(a)..], &b[strip(b)..]);
    na.len()
        .cmp(&nb.len())
        .then_with(|| na.cmp(nb))
        .then_with(|| a.len().cmp(&b.len()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn numbers_compare_by_value() {
        assert_eq!(natural_cmp("file2", "file10"), Ordering::Less);
        assert_eq!(natural_cmp("file10", "file2"), Ordering::Greater);
    }

    #[test]
    fn case_is_ignored_before_tiebreak() {
        assert_eq!(natural_cmp("Alpha", "beta"), Ordering::Less);
        assert_ne!(natural_cmp("a", "A"), Ordering::Equal);
    }

    #[test]
    fn leading_zeros_sort_after_short_form() {
        assert_eq!(natural_cmp("v7", "v07"), Ordering::Less);
        assert_eq!(natural_cmp("v007", "v8"), Ordering::Less);
    }

    #[test]
    fn prefix_sorts_first() {
        assert_eq!(natural_cmp("img", "img1"), Ordering::Less);
    }

    #[test]
    fn huge_digit_runs_do_not_overflow() {
        let a = format!("x{}", "9".repeat(60));
        let b = format!("x1{}", "0".repeat(60));
        assert_eq!(natural_cmp(&a, &b), Ordering::Less);
    }

    #[test]
    fn sorting_a_listing() {
        let mut names = vec!["track10.ogg", "Track2.ogg", "track1.ogg", "track02.ogg"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, ["track1.ogg", "Track2.ogg", "track02.ogg", "track10.ogg"]);
    }

    proptest! {
        #[test]
        fn order_is_antisymmetric(a in "[a-zA-Z0-9]{0,12}", b in "[a-zA-Z0-9]{0,12}") {
            prop_assert_eq!(natural_cmp(&a, &b), natural_cmp(&b, &a).reverse());
        }

        #[test]
        fn equal_only_when_identical(a in "[a-z0-9]{0,12}", b in "[a-z0-9]{0,12}") {
            prop_assert_eq!(natural_cmp(&a, &b) == Ordering::Equal, a == b);
        }
    }
}
