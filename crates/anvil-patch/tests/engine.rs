//! Behavioural tests for the replace engine across the whole cascade.

use assert_matches::assert_matches;
use proptest::prelude::*;

use anvil_patch::{PatchError, Strategy, find_match, replace, replace_with_report};

#[test]
fn replaces_single_line_in_middle() {
    assert_eq!(replace("a\nb\nc", "b", "B", false).unwrap(), "a\nB\nc");
}

#[test]
fn replace_all_replaces_every_occurrence() {
    assert_eq!(
        replace("dog cat dog", "dog", "wolf", true).unwrap(),
        "wolf cat wolf"
    );
}

#[test]
fn unindented_block_matches_indented_source() {
    let content = "function x() {\n  return 1;\n}";
    let out = replace(content, "function x() {\nreturn 1;\n}", "function y() {}", false).unwrap();
    assert_eq!(out, "function y() {}");
}

#[test]
fn unknown_text_is_not_found() {
    assert_matches!(replace("abc", "zzz", "x", false), Err(PatchError::NotFound { .. }));
}

#[test]
fn line_trimmed_keeps_neighbouring_indentation() {
    let content = "impl A {\n    fn a() {}\n    fn b() {}\n}\n";
    let out = replace(content, "fn a() {}\nfn b() {}", "    fn c() {}", false).unwrap();
    assert_eq!(out, "impl A {\n    fn c() {}\n}\n");
}

#[test]
fn ambiguity_in_fuzzy_strategy_is_reported() {
    // no exact hit; both indented copies match line-trimmed
    let content = "  x()\n  y()\nz\n    x()\n    y()\n";
    let err = replace(content, "x()\ny()", "w()", false).unwrap_err();
    assert_matches!(err, PatchError::AmbiguousMatch { strategy: "line-trimmed", count: 2 });
    assert!(err.to_string().contains("context"));
}

#[test]
fn self_overlapping_target_is_ambiguous() {
    assert_matches!(
        replace("aaa", "aa", "X", false),
        Err(PatchError::AmbiguousMatch { count: 2, .. })
    );
    let content = "x = aba_aba_aba;";
    assert_matches!(
        replace(content, "aba_aba", "Q", false),
        Err(PatchError::AmbiguousMatch { strategy: "exact", .. })
    );
    assert_eq!(replace(content, "aba_aba_aba", "Q", false).unwrap(), "x = Q;");
}

#[test]
fn overlapping_whitespace_drift_is_ambiguous() {
    // no literal hit; the normalized pattern matches at overlapping offsets
    assert_matches!(
        replace("aba  aba\taba", "aba aba", "Q", false),
        Err(PatchError::AmbiguousMatch { strategy: "whitespace-normalized", count: 2 })
    );
}

#[test]
fn drifted_block_resolves_by_anchor() {
    let content = "fn main() {\n    let total = compute(a, b);\n    println!(\"{total}\");\n}\n";
    let old = "fn main() {\n    let total = compute(a,b);\n    println!(\"{}\", total);\n}";
    let report = replace_with_report(content, old, "fn main() {}", false).unwrap();
    assert_eq!(report.strategy, Strategy::BlockAnchor);
    assert_eq!(report.content, "fn main() {}\n");
}

#[test]
fn multiline_replace_all_uses_literal_occurrences_only() {
    let content = "a = 1\nb = 2\n  a = 1\n";
    let report = replace_with_report(content, "a = 1", "a = 9", true).unwrap();
    assert_eq!(report.count, 2);
    assert_eq!(report.strategy, Strategy::MultiOccurrence);
    assert_eq!(report.content, "a = 9\nb = 2\n  a = 9\n");
}

#[test]
fn crlf_lines_match_line_trimmed() {
    let content = "one\r\ntwo\r\nthree\r\n";
    let found = find_match(content, "one\ntwo").unwrap();
    assert_eq!(found.strategy, Strategy::LineTrimmed);
    assert_eq!(found.text, "one\r\ntwo\r");
}

proptest! {
    #[test]
    fn unique_target_is_replaced_in_place(
        prefix in "[a-z \n]{0,30}",
        body in "[a-z]{0,8}",
        suffix in "[a-z \n]{0,30}",
        replacement in "[A-Z]{0,8}",
    ) {
        // '#' occurs only inside the target, so it appears exactly once
        let target = format!("#{body}");
        let content = format!("{prefix}{target}{suffix}");
        let out = replace(&content, &target, &replacement, false).unwrap();
        prop_assert_eq!(out, format!("{prefix}{replacement}{suffix}"));
    }

    #[test]
    fn repeated_target_is_ambiguous_unless_replace_all(
        segments in proptest::collection::vec("[a-z ]{0,10}", 3..6),
    ) {
        let target = "#t#";
        let content = segments.join(target);
        let n = segments.len() - 1;

        let single = replace(&content, target, "X", false);
        prop_assert!(
            matches!(single, Err(PatchError::AmbiguousMatch { count, .. }) if count == n),
            "expected ambiguity over {} matches",
            n
        );

        let all = replace_with_report(&content, target, "X", true).unwrap();
        prop_assert_eq!(all.count, n);
        prop_assert_eq!(all.content, segments.join("X"));
    }

    #[test]
    fn periodic_target_is_never_silently_resolved(
        unit in "[a-c]{1,3}",
        repeats in 3usize..6,
        len in 2usize..4,
    ) {
        // a target made of repeated units recurs at shifted, overlapping offsets
        let content = unit.repeat(repeats);
        let target = unit.repeat(len.min(repeats - 1));
        prop_assert!(
            matches!(
                replace(&content, &target, "X", false),
                Err(PatchError::AmbiguousMatch { .. })
            ),
            "{} in {} resolved to a single span",
            target,
            content
        );
    }

    #[test]
    fn empty_old_never_fails(content in "\\PC{0,40}", new in "[a-z]{0,5}") {
        prop_assert_eq!(replace(&content, "", &new, false).unwrap(), format!("{new}{content}"));
        prop_assert_eq!(replace(&content, "", &new, true).unwrap(), format!("{new}{content}"));
    }

    #[test]
    fn resolution_is_deterministic(content in "[a-c \n]{0,40}", old in "[a-c \n]{1,6}") {
        let first = find_match(&content, &old);
        let second = find_match(&content, &old);
        match (first, second) {
            (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
            (Err(a), Err(b)) => prop_assert_eq!(a.to_string(), b.to_string()),
            _ => prop_assert!(false, "resolution differed between calls"),
        }
    }

    #[test]
    fn trimmed_lines_match_regardless_of_indent(
        words in proptest::collection::vec("[a-z]{1,6}", 2..5),
        indent in 1usize..6,
    ) {
        let pad = " ".repeat(indent);
        let body: Vec<String> = words.iter().enumerate().map(|(i, w)| format!("{w}{i}")).collect();
        let content = format!(
            "#head\n{}\n#tail",
            body.iter().map(|l| format!("{pad}{l}")).collect::<Vec<_>>().join("\n")
        );
        let old = body.join("\n");
        let found = find_match(&content, &old).unwrap();
        prop_assert_eq!(found.strategy, Strategy::LineTrimmed);
        prop_assert!(found.text.starts_with(&pad));
        let out = replace(&content, &old, "X", false).unwrap();
        prop_assert_eq!(out, "#head\nX\n#tail");
    }
}
