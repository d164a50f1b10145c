use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    haven::cli::main()
}
