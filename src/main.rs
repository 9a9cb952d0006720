use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    oneagent_mcp::cli::main()
}
