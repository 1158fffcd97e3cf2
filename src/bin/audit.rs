use std::error::Error;

use instruct_corpus::apps::run_audit;

fn main() -> Result<(), Box<dyn Error>> {
    run_audit(std::env::args().skip(1))
}
