#![no_main]

use libfuzzer_sys::fuzz_target;
use ldapwire::ldap::parse_ldap_filter;
use ldapwire::ldap::transform::{filter_to_domain, filter_to_wire};

fuzz_target!(|data: &[u8]| {
    let Ok(filter_str) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(filter) = parse_ldap_filter(filter_str) {
        // The rendered form must always be parseable again
        let rendered = filter.to_string();
        assert!(
            parse_ldap_filter(&rendered).is_ok(),
            "rendered filter {:?} does not parse",
            rendered
        );

        if let Ok(wire) = filter_to_wire(&filter) {
            assert_eq!(filter_to_domain(wire).unwrap(), filter);
        }
    }
});
