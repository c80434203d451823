fn main() {
    // sqlx::migrate! embeds the migration files at compile time.
    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    println!("cargo:rerun-if-changed=migrations");
}
