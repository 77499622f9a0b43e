fn main() -> Result<(), Box<dyn std::error::Error>> {
    confab::cli::main()
}
