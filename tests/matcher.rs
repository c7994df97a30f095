//! Property tests for the selector predicates.

use classmend::matcher::{matches_descriptor, matches_name};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,7}"
}

fn field_type() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("I".to_string()),
        Just("J".to_string()),
        Just("Z".to_string()),
        Just("[I".to_string()),
        Just("Ljava/lang/String;".to_string()),
        segment().prop_map(|name| format!("Lorg/{name}/Type;")),
    ]
}

fn return_type() -> impl Strategy<Value = String> {
    prop_oneof![Just("V".to_string()), field_type()]
}

proptest! {
    /// A namespace selector matches its members and never a sibling sharing its prefix.
    #[test]
    fn test_namespace_prefix(namespace in segment(), member in segment(), suffix in segment()) {
        let selector = format!("com/{namespace}/");
        let direct = format!("com/{namespace}/{member}");
        let nested = format!("com/{namespace}/{member}/{suffix}");
        let sibling = format!("com/{namespace}{suffix}/{member}");
        let bare = format!("com/{namespace}");
        prop_assert!(matches_name(&selector, &direct));
        prop_assert!(matches_name(&selector, &nested));
        prop_assert!(!matches_name(&selector, &sibling));
        prop_assert!(!matches_name(&selector, &bare));
    }

    /// Exact selectors match nothing but the exact name.
    #[test]
    fn test_exact_name(name in segment(), other in segment()) {
        let full = format!("com/foo/{name}");
        let different = format!("com/foo/{other}");
        prop_assert!(matches_name(&full, &full));
        prop_assert!(matches_name("", &full));
        prop_assert_eq!(matches_name(&full, &different), name == other);
    }

    /// A parameter fragment matches whatever the method returns.
    #[test]
    fn test_parameter_fragment(returns in return_type(), first in field_type(), second in field_type()) {
        let single = format!("(I){returns}");
        let params = format!("({first}{second})");
        let pair = format!("{params}{returns}");
        let longer = format!("(I{first}){returns}");
        prop_assert!(matches_descriptor("(I)", &single));
        prop_assert!(matches_descriptor(&params, &pair));
        prop_assert!(!matches_descriptor("(I)", &longer));
    }

    /// A return fragment matches whatever the method takes.
    #[test]
    fn test_return_fragment(returns in return_type(), first in field_type(), second in field_type()) {
        let descriptor = format!("({first}{second}){returns}");
        prop_assert!(matches_descriptor(&returns, &descriptor));
        prop_assert!(matches_descriptor(&descriptor, &descriptor));
        prop_assert!(matches_descriptor("", &descriptor));
    }

    /// A return fragment matches any descriptor ending with it.
    #[test]
    fn test_return_fragment_is_a_suffix(first in field_type()) {
        let array = format!("({first})[I");
        let string = format!("({first})Ljava/lang/String;");
        let void = format!("({first})V");
        prop_assert!(matches_descriptor("I", &array));
        prop_assert!(matches_descriptor("String;", &string));
        prop_assert!(!matches_descriptor("String;", &void));
    }
}
