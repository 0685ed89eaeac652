//! Fuzz target for [`Name`] URI parsing
//!
//! # Strategy
//!
//! - Raw strings: arbitrary text through `Name::from_uri`
//! - Raw components: arbitrary byte components rendered and reparsed
//!
//! # Invariants
//!
//! - Parsing NEVER panics
//! - A parsed name renders to a URI that parses back to the same name
//! - Any name built from components survives render then parse
//! - Numeric components decode to the number they were built from

#![no_main]

use arbitrary::Arbitrary;
use chronosim_core::{Component, Name};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    uri: String,
    components: Vec<Vec<u8>>,
    number: u64,
}

fuzz_target!(|input: FuzzInput| {
    if let Ok(name) = Name::from_uri(&input.uri) {
        let rendered = name.to_string();
        let reparsed = Name::from_uri(&rendered).expect("rendered URI must parse");
        assert_eq!(reparsed, name, "URI {:?} rendered as {rendered}", input.uri);
    }

    let built: Name = input.components.into_iter().map(Component::new).collect();
    let rendered = built.to_string();
    let reparsed = Name::from_uri(&rendered).expect("rendered URI must parse");
    assert_eq!(reparsed, built, "rendered as {rendered}");

    let numbered = built.append_number(input.number);
    assert_eq!(numbered.last().and_then(Component::to_number), Some(input.number));
});
