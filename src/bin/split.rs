use std::error::Error;

use instruct_corpus::apps::run_split;

fn main() -> Result<(), Box<dyn Error>> {
    run_split(std::env::args().skip(1))
}
