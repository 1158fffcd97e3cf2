use std::error::Error;

use instruct_corpus::apps::run_sample;

fn main() -> Result<(), Box<dyn Error>> {
    run_sample(std::env::args().skip(1))
}
