//! Integration tests for texture loading.

use lumen_resources::{ResourceError, TextureData};

#[test]
fn test_load_png_with_mips() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("gradient.png");

    let image = image::RgbaImage::from_fn(16, 8, |x, y| image::Rgba([x as u8 * 16, y as u8 * 32, 0, 255]));
    image.save(&path).expect("Failed to write test PNG");

    let texture = TextureData::load(&path).expect("Failed to load PNG");
    assert_eq!((texture.width(), texture.height()), (16, 8));
    assert_eq!(texture.mip_count(), 1);
    assert_eq!(&texture.levels()[0].pixels[4..8], &[16, 0, 0, 255]);

    let texture = texture.with_mips();
    assert_eq!(texture.mip_count(), 5);

    let last = texture.levels().last().expect("mip chain is empty");
    assert_eq!((last.width, last.height), (1, 1));
    assert_eq!(last.row_pitch, 4);
}

#[test]
fn test_load_rejects_non_image() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"not a png").expect("Failed to write file");

    assert!(matches!(TextureData::load(&path), Err(ResourceError::Image(_))));
}
