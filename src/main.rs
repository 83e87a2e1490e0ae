fn main() -> Result<(), Box<dyn std::error::Error>> {
    mcp_broker::cli::main()
}
