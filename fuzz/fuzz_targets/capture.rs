use std::fs;
use std::path::Path;

/// Persist a panicking input under `fuzz/artifacts/<target>/`.
pub fn record_panic(target: &str, data: &[u8]) {
    let digest = matrix_abi::sha256_hex(data);
    let dir = Path::new("fuzz").join("artifacts").join(target);
    if let Err(err) = fs::create_dir_all(&dir) {
        eprintln!("fuzz panic capture failed: target={target} err={err}");
        return;
    }
    let path = dir.join(format!("panic_{}.bin", &digest[..16]));
    if let Err(err) = fs::write(&path, data) {
        eprintln!(
            "fuzz panic capture failed: target={target} path={} err={err}",
            path.display()
        );
        return;
    }
    eprintln!(
        "fuzz panic captured: target={target} path={} len={} seed_hex={}",
        path.display(),
        data.len(),
        hex::encode(&data[..data.len().min(64)])
    );
}
