#[cfg(test)]
mod discovery;
#[cfg(test)]
mod support;
