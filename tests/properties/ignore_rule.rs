//! Property tests for the dotfile ignore rule.

use std::ffi::OsStr;

use proptest::prelude::*;

use rerun::is_ignored;

fn entry_name() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z0-9 _.~#-]{1,24}").unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: A name is ignored exactly when it starts with a dot.
    #[test]
    fn property_ignored_iff_leading_dot(name in entry_name()) {
        prop_assert_eq!(is_ignored(OsStr::new(&name)), name.starts_with('.'));
    }

    /// PROPERTY: Dots anywhere but the front never hide an entry.
    #[test]
    fn property_inner_dots_do_not_hide(stem in "[A-Za-z0-9_]{1,12}", ext in "[A-Za-z0-9.]{0,8}") {
        let name = format!("{stem}.{ext}");
        prop_assert!(!is_ignored(OsStr::new(&name)));
    }
}

#[cfg(unix)]
proptest! {
    /// PROPERTY: The rule looks at bytes, so non-UTF-8 names are handled too.
    #[test]
    fn property_non_utf8_names(tail in proptest::collection::vec(0x80u8..=0xff, 1..16), hidden in any::<bool>()) {
        use std::os::unix::ffi::OsStrExt;

        let mut bytes = if hidden { vec![b'.'] } else { vec![b'x'] };
        bytes.extend(tail);
        prop_assert_eq!(is_ignored(OsStr::from_bytes(&bytes)), hidden);
    }
}
