//! Fuzz testing for request validation.
//!
//! Every validator must accept arbitrary input without panicking, including
//! invalid UTF-8 boundaries, huge strings and extreme integers.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use greenlight::validation::{
    Validator, token_plaintext_is_valid, validate_email, validate_movie, validate_name,
    validate_password_plaintext,
};

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    text: &'a str,
    year: i32,
    runtime: i32,
    genres: Vec<String>,
}

fuzz_target!(|input: Input<'_>| {
    let mut v = Validator::new();
    validate_email(&mut v, input.text);
    validate_password_plaintext(&mut v, input.text);
    validate_name(&mut v, input.text);
    validate_movie(&mut v, input.text, input.year, input.runtime, &input.genres);
    let _ = v.is_valid();

    // Token shape check is used by the authenticator on raw header values
    let _ = token_plaintext_is_valid(input.text);
});
