use std::error::Error;

use instruct_corpus::apps::run_merge;

fn main() -> Result<(), Box<dyn Error>> {
    run_merge(std::env::args().skip(1))
}
