use std::error::Error;

use instruct_corpus::apps::run_parse_concatenated;

fn main() -> Result<(), Box<dyn Error>> {
    run_parse_concatenated(std::env::args().skip(1))
}
