use std::error::Error;

use instruct_corpus::apps::run_validate;

fn main() -> Result<(), Box<dyn Error>> {
    run_validate(std::env::args().skip(1))
}
