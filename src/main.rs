fn main() -> anyhow::Result<()> {
    readsieve::cli::run::entry()
}
