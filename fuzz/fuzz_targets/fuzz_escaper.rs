#![no_main]

use libfuzzer_sys::fuzz_target;
use wikiquery::query::escaper::{Escaper, is_balanced};

fuzz_target!(|data: &str| {
    // Fixed-up query strings must always be balanced
    let escaper = Escaper::new("en");
    let (fixed, _) = escaper.fixup_whole_query_string(data);
    assert!(is_balanced(&fixed), "unbalanced output {:?}", fixed);
    let _ = escaper.fixup_query_string_part(data);
    let _ = escaper.escape_quote_pairs(data);
});
