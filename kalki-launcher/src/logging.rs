pub fn init() {
    use env_logger::Target;
    use std::fs;
    use std::io;

    // Keep a transcript of every privileged command for one-shot installs.
    // If the file cannot be created (permissions, readonly FS, etc.), fall
    // back to stderr.
    let target = (|| -> io::Result<Target> {
        let dir = std::env::temp_dir().join("kalki-launcher");
        fs::create_dir_all(&dir)?;
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("install.log"))?;
        Ok(Target::Pipe(Box::new(file)))
    })()
    .unwrap_or(Target::Stderr);

    env_logger::Builder::from_default_env()
        .target(target)
        .filter_level(log::LevelFilter::Info)
        .init();
}
