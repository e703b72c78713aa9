use crate::decoder::CustomAction;

/// A consumer of the decoder's custom-action stream.
///
/// Actions are fed in emission order; `finish` is called once after the
/// last one.
pub trait Analyzer {
    fn process(&mut self, action: &CustomAction);
    fn finish(&mut self);
}

/// Feeds every action to each analyzer in turn, then finishes them.
pub fn run_analyzers(actions: &[CustomAction], analyzers: &mut [&mut dyn Analyzer]) {
    for action in actions {
        for analyzer in analyzers.iter_mut() {
            analyzer.process(action);
        }
    }
    for analyzer in analyzers.iter_mut() {
        analyzer.finish();
    }
}
