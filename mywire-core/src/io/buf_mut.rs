pub trait BufMutExt {
    /// Writes the bytes of `s` followed by a NUL terminator.
    fn put_str_nul(&mut self, s: &str);

    /// Writes `bytes` followed by a NUL terminator.
    fn put_bytes_nul(&mut self, bytes: &[u8]);
}

impl BufMutExt for Vec<u8> {
    fn put_str_nul(&mut self, s: &str) {
        self.put_bytes_nul(s.as_bytes());
    }

    fn put_bytes_nul(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
        self.push(0);
    }
}
